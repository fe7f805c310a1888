//! Dashboard host: one select loop over ticks, feed signals, console input
//! and registration completions.

use crate::channel::{self, ChannelSignal};
use crate::config::Config;
use crate::console::{self, Command, HELP};
use crate::registration::{HttpRegistrar, Registrar, RegistrationError};
use crate::render_loop::{RenderLoop, Snapshot};
use crate::shell::DashboardShell;
use anyhow::{Context, Result};
use gatewatch_core::overlay::load_font;
use gatewatch_core::{FaceDetector, OverlaySurface};
use gatewatch_hw::{FrameSource, SourceSpec, UnavailableSource};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

type Completion = Result<(), RegistrationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Dashboard state plus the handles its commands act on.
pub struct Dashboard<R> {
    pub shell: DashboardShell,
    pub render: RenderLoop,
    registrar: R,
    completions: mpsc::Sender<Completion>,
}

impl<R> Dashboard<R>
where
    R: Registrar + Clone + Send + Sync + 'static,
{
    pub fn new(
        shell: DashboardShell,
        render: RenderLoop,
        registrar: R,
        completions: mpsc::Sender<Completion>,
    ) -> Self {
        Self {
            shell,
            render,
            registrar,
            completions,
        }
    }

    /// Feed signal. Prints each new event as it arrives.
    pub fn on_signal(&mut self, signal: ChannelSignal) {
        if self.shell.apply(signal) {
            if let Some(event) = self.shell.last_event() {
                println!("» {}", event.summary());
            }
        }
    }

    pub fn on_completion(&mut self, result: Completion) {
        let ok = result.is_ok();
        self.shell.finish_submit(result);
        if ok {
            println!("person added");
        } else if let Some(error) = self.shell.error() {
            println!("{error}");
        }
    }

    pub fn on_tick(&mut self) {
        let verdicts = self.shell.overlay_verdicts(Instant::now());
        self.render.tick(&verdicts);
    }

    pub fn execute(&mut self, command: Command) -> Flow {
        match command {
            Command::Status => print!("{}", console::render_status(&self.shell.status_view())),
            Command::Help => println!("{HELP}"),
            Command::Quit => return Flow::Quit,
            Command::Dismiss(i) => {
                if !self.shell.dismiss(i) {
                    println!("no notification {i}");
                }
            }
            Command::Add(source) => {
                if !self.shell.request_add_person(source) {
                    println!("no such notification");
                }
            }
            Command::Name(name) => {
                if !self.shell.set_name(&name) {
                    println!("no Add Person dialog open");
                }
            }
            Command::Preview(path) => match self.shell.dialog_preview_jpeg() {
                Ok(Some(bytes)) => match std::fs::write(&path, bytes) {
                    Ok(()) => println!("preview written to {}", path.display()),
                    Err(e) => println!("failed to write {}: {e}", path.display()),
                },
                Ok(None) => println!("no preview image"),
                Err(e) => println!("preview unreadable: {e}"),
            },
            Command::Submit => self.submit(),
            Command::Cancel => {
                if !self.shell.cancel_dialog() {
                    println!("nothing to cancel");
                }
            }
            Command::Video(true) => {
                if let Err(e) = self.render.start() {
                    tracing::warn!(error = %e, "video start failed");
                    println!("video unavailable: {e}");
                }
            }
            Command::Video(false) => self.render.stop(),
        }
        Flow::Continue
    }

    fn submit(&mut self) {
        let Some(request) = self.shell.begin_submit() else {
            match self.shell.error() {
                Some(error) => println!("{error}"),
                None => println!("nothing to submit"),
            }
            return;
        };
        let registrar = self.registrar.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = registrar.add_person(&request).await;
            let _ = completions.send(result).await;
        });
    }
}

/// Open the configured frame source, or a stand-in that never streams.
fn frame_source(config: &Config) -> Box<dyn FrameSource> {
    let opened = config
        .source
        .parse::<SourceSpec>()
        .and_then(|spec| spec.open());
    match opened {
        Ok(source) => source,
        Err(e) => {
            tracing::warn!(source = %config.source, error = %e, "running without video");
            Box::new(UnavailableSource::new(e.to_string()))
        }
    }
}

/// Assemble the dashboard described by `config`, with autostart applied.
/// Returns the receiver for registration completions.
pub fn build(config: &Config) -> Result<(Dashboard<HttpRegistrar>, mpsc::Receiver<Completion>)> {
    let mut surface = OverlaySurface::new(1, 1);
    if let Some(path) = &config.overlay_font {
        let font = load_font(path).with_context(|| format!("loading {}", path.display()))?;
        surface = surface.with_font(font);
    }
    let snapshot = config.snapshot_path.clone().map(|path| Snapshot {
        path,
        every: config.snapshot_every,
    });
    let render = RenderLoop::new(frame_source(config), FaceDetector::default(), surface)
        .with_snapshot(snapshot);

    let shell = DashboardShell::new(
        config.history_capacity,
        config.include_name,
        config.verdict_ttl(),
    );
    let registrar = HttpRegistrar::new(config.add_person_url(), config.registration_timeout())?;

    let (completion_tx, completions) = mpsc::channel(4);
    let mut dashboard = Dashboard::new(shell, render, registrar, completion_tx);

    if config.autostart_video {
        dashboard.execute(Command::Video(true));
    }
    Ok((dashboard, completions))
}

/// Build the dashboard from `config` and run until quit or ctrl-c.
pub async fn run(config: Config) -> Result<()> {
    let (mut dashboard, mut completions) = build(&config)?;

    let (signal_tx, mut signals) = mpsc::channel(64);
    let channel = tokio::spawn(channel::run(
        config.event_url.clone(),
        config.backoff(),
        signal_tx,
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tracing::info!(
        event_url = %config.event_url,
        api = %config.api_base,
        source = %config.source,
        "dashboard ready"
    );

    loop {
        tokio::select! {
            _ = ticker.tick(), if dashboard.render.is_streaming() => dashboard.on_tick(),
            Some(signal) = signals.recv() => dashboard.on_signal(signal),
            Some(result) = completions.recv() => dashboard.on_completion(result),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match Command::parse(&line) {
                    Ok(Some(command)) => {
                        if dashboard.execute(command) == Flow::Quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                },
                Ok(None) => {
                    tracing::info!("console closed, continuing headless");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "console read failed");
                    stdin_open = false;
                }
            },
            _ = &mut ctrl_c => break,
        }
    }

    tracing::info!("dashboard shutting down");
    dashboard.render.stop();
    channel.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::AddPersonRequest;
    use crate::shell::DialogSource;
    use gatewatch_hw::ImageSequenceSource;
    use image::{Rgba, RgbaImage};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingRegistrar {
        requests: Arc<Mutex<Vec<AddPersonRequest>>>,
    }

    impl Registrar for RecordingRegistrar {
        async fn add_person(&self, request: &AddPersonRequest) -> Result<(), RegistrationError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn dashboard(
        dir: &std::path::Path,
    ) -> (Dashboard<RecordingRegistrar>, mpsc::Receiver<Completion>) {
        let path = dir.join("frame.png");
        RgbaImage::from_pixel(32, 24, Rgba([50, 50, 50, 255]))
            .save(&path)
            .unwrap();
        let source = ImageSequenceSource::new(vec![path]).unwrap();
        let render = RenderLoop::new(
            Box::new(source),
            FaceDetector::default(),
            OverlaySurface::new(1, 1),
        );
        let shell = DashboardShell::new(10, false, Duration::from_secs(3));
        let (tx, rx) = mpsc::channel(4);
        (
            Dashboard::new(shell, render, RecordingRegistrar::default(), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn test_submit_runs_in_background_and_closes_dialog() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut dash, mut completions) = dashboard(tmp.path());
        dash.on_signal(ChannelSignal::Message(
            r#"{"event_type":"recognition","data":{"recognized":false,"vector":[1.0,2.0]}}"#
                .into(),
        ));
        dash.execute(Command::Add(DialogSource::LastEvent));
        assert_eq!(dash.execute(Command::Submit), Flow::Continue);
        assert!(dash.shell.dialog().unwrap().submitting);

        let result = completions.recv().await.unwrap();
        dash.on_completion(result);

        assert!(dash.shell.dialog().is_none());
        let sent = dash.registrar.requests.lock().unwrap().clone();
        assert_eq!(sent, vec![AddPersonRequest::new(vec![1.0, 2.0])]);
    }

    #[tokio::test]
    async fn test_video_toggle_controls_ticking() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut dash, _completions) = dashboard(tmp.path());
        assert!(!dash.render.is_streaming());

        dash.execute(Command::Video(true));
        assert!(dash.render.is_streaming());
        dash.on_tick();

        dash.execute(Command::Video(false));
        assert!(!dash.render.is_streaming());
    }

    #[tokio::test]
    async fn test_missing_source_leaves_feed_and_registration_working() {
        let config = Config {
            source: "dir:/nonexistent/gatewatch-frames".into(),
            ..Config::default()
        };
        let (mut dash, _completions) = build(&config).unwrap();
        assert!(!dash.render.is_streaming());
        assert_eq!(dash.execute(Command::Video(true)), Flow::Continue);
        assert!(!dash.render.is_streaming());

        dash.on_signal(ChannelSignal::Opened);
        dash.on_signal(ChannelSignal::Message(
            r#"{"event_type":"recognition","data":{"recognized":false,"vector":[0.5]}}"#.into(),
        ));
        assert_eq!(dash.shell.history().len(), 1);
        assert!(dash.shell.request_add_person(DialogSource::LastEvent));
        assert!(dash.shell.begin_submit().is_some());
    }

    #[cfg(not(feature = "v4l"))]
    #[tokio::test]
    async fn test_default_config_builds_without_camera_support() {
        let (mut dash, _completions) = build(&Config::default()).unwrap();
        assert!(!dash.render.is_streaming());
        dash.on_tick();
        dash.on_signal(ChannelSignal::Opened);
        assert_eq!(dash.shell.status_view().connection, "connected");
    }

    #[tokio::test]
    async fn test_quit_stops_the_loop() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut dash, _completions) = dashboard(tmp.path());
        assert_eq!(dash.execute(Command::Quit), Flow::Quit);
        assert_eq!(dash.execute(Command::Dismiss(0)), Flow::Continue);
    }
}
