use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::channel::Backoff;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Dashboard configuration.
///
/// Loaded from the TOML file named by `GATEWATCH_CONFIG` (if set), then
/// overridden by `GATEWATCH_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebSocket URL of the recognition event feed.
    pub event_url: String,
    /// Base URL of the backend HTTP API.
    pub api_base: String,
    /// Frame source: `camera:<device>`, `dir:<path>` or `file:<path>`.
    pub source: String,
    /// Render ticks per second.
    pub frame_rate: u32,
    /// Start sampling video immediately.
    pub autostart_video: bool,
    /// Number of notifications kept in the history.
    pub history_capacity: usize,
    /// Timeout for one add-person request.
    pub registration_timeout_secs: u64,
    /// Also send the operator-entered name with the feature vector.
    pub include_name: bool,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// TTF/OTF font for overlay label text.
    pub overlay_font: Option<PathBuf>,
    /// Periodically write the composited frame here.
    pub snapshot_path: Option<PathBuf>,
    /// Write a snapshot every N ticks.
    pub snapshot_every: u32,
    /// How long a recognition verdict keeps colouring the overlay.
    pub verdict_ttl_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            event_url: "ws://localhost:8000/ws".to_string(),
            api_base: "http://localhost:8000".to_string(),
            source: "camera:/dev/video0".to_string(),
            frame_rate: 15,
            autostart_video: true,
            history_capacity: gatewatch_core::HISTORY_CAPACITY,
            registration_timeout_secs: 10,
            include_name: false,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            overlay_font: None,
            snapshot_path: None,
            snapshot_every: 30,
            verdict_ttl_ms: 3_000,
        }
    }
}

impl Config {
    /// Load from `GATEWATCH_CONFIG` and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("GATEWATCH_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `GATEWATCH_*` overrides looked up through `lookup`.
    /// Unparseable values are ignored and the current value kept.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("GATEWATCH_EVENT_URL") {
            self.event_url = v;
        }
        if let Some(v) = lookup("GATEWATCH_API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = lookup("GATEWATCH_SOURCE") {
            self.source = v;
        }
        self.frame_rate = parsed(&lookup, "GATEWATCH_FRAME_RATE", self.frame_rate);
        self.autostart_video = flag(&lookup, "GATEWATCH_AUTOSTART_VIDEO", self.autostart_video);
        self.history_capacity = parsed(&lookup, "GATEWATCH_HISTORY_CAPACITY", self.history_capacity);
        self.registration_timeout_secs = parsed(
            &lookup,
            "GATEWATCH_REGISTRATION_TIMEOUT_SECS",
            self.registration_timeout_secs,
        );
        self.include_name = flag(&lookup, "GATEWATCH_INCLUDE_NAME", self.include_name);
        self.reconnect_initial_ms =
            parsed(&lookup, "GATEWATCH_RECONNECT_INITIAL_MS", self.reconnect_initial_ms);
        self.reconnect_max_ms = parsed(&lookup, "GATEWATCH_RECONNECT_MAX_MS", self.reconnect_max_ms);
        if let Some(v) = lookup("GATEWATCH_OVERLAY_FONT") {
            self.overlay_font = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("GATEWATCH_SNAPSHOT_PATH") {
            self.snapshot_path = Some(PathBuf::from(v));
        }
        self.snapshot_every = parsed(&lookup, "GATEWATCH_SNAPSHOT_EVERY", self.snapshot_every);
        self.verdict_ttl_ms = parsed(&lookup, "GATEWATCH_VERDICT_TTL_MS", self.verdict_ttl_ms);
        self
    }

    /// Full URL of the add-person endpoint.
    pub fn add_person_url(&self) -> String {
        format!("{}/add-person", self.api_base.trim_end_matches('/'))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs.max(1))
    }

    pub fn verdict_ttl(&self) -> Duration {
        Duration::from_millis(self.verdict_ttl_ms)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.reconnect_initial_ms),
            Duration::from_millis(self.reconnect_max_ms),
        )
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    current: T,
) -> T {
    match lookup(key) {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparseable config override");
            current
        }),
        None => current,
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: bool) -> bool {
    lookup(key).map(|v| v != "0" && !v.eq_ignore_ascii_case("false")).unwrap_or(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.event_url, "ws://localhost:8000/ws");
        assert_eq!(config.add_person_url(), "http://localhost:8000/add-person");
        assert_eq!(config.history_capacity, 10);
        assert!(!config.include_name);
        assert_eq!(config.registration_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_overrides(env(&[
            ("GATEWATCH_API_BASE", "https://gate.example/"),
            ("GATEWATCH_FRAME_RATE", "30"),
            ("GATEWATCH_INCLUDE_NAME", "1"),
            ("GATEWATCH_SOURCE", "dir:/srv/frames"),
        ]));
        assert_eq!(config.add_person_url(), "https://gate.example/add-person");
        assert_eq!(config.frame_rate, 30);
        assert!(config.include_name);
        assert_eq!(config.source, "dir:/srv/frames");
    }

    #[test]
    fn test_bad_override_keeps_current_value() {
        let config = Config::default().with_overrides(env(&[("GATEWATCH_FRAME_RATE", "fast")]));
        assert_eq!(config.frame_rate, 15);
    }

    #[test]
    fn test_flag_false_spellings() {
        let config = Config::default().with_overrides(env(&[("GATEWATCH_AUTOSTART_VIDEO", "false")]));
        assert!(!config.autostart_video);
        let config = Config::default().with_overrides(env(&[("GATEWATCH_AUTOSTART_VIDEO", "0")]));
        assert!(!config.autostart_video);
    }

    #[test]
    fn test_toml_file_with_partial_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gatewatch.toml");
        std::fs::write(
            &path,
            "event_url = \"ws://gate:9000/ws\"\nframe_rate = 5\nverdict_ttl_ms = 100\n",
        )
        .unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.event_url, "ws://gate:9000/ws");
        assert_eq!(config.frame_rate, 5);
        assert_eq!(config.verdict_ttl(), Duration::from_millis(100));
        // Unspecified keys keep their defaults.
        assert_eq!(config.reconnect_max_ms, 30_000);
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "frame_rate = \"many\"").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_tick_interval_never_divides_by_zero() {
        let config = Config { frame_rate: 0, ..Config::default() };
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }
}
