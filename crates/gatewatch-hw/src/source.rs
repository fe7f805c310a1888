//! Frame sampler: where per-tick video frames come from.

use gatewatch_core::{FrameError, PixelFrame};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// File extensions accepted by [`ImageSequenceSource`].
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source not started")]
    NotStarted,
    #[error("no images found in {0}")]
    NoImages(String),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        source: image::ImageError,
    },
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
    #[cfg(feature = "v4l")]
    #[error("camera: {0}")]
    Camera(#[from] crate::camera::CameraError),
    #[error("unsupported source spec `{0}` (expected camera:<device>, dir:<path> or file:<path>)")]
    BadSpec(String),
    #[error("no video: {0}")]
    Unavailable(String),
}

/// A producer of video frames, sampled once per render tick.
///
/// `stop` must release any underlying device; a stopped source can be
/// started again.
pub trait FrameSource {
    fn start(&mut self) -> Result<(), SourceError>;
    fn next_frame(&mut self) -> Result<PixelFrame, SourceError>;
    fn stop(&mut self);
    fn is_active(&self) -> bool;
    fn describe(&self) -> String;
}

/// Parsed `--source` / `GATEWATCH_SOURCE` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Camera(String),
    Directory(PathBuf),
    File(PathBuf),
}

impl FromStr for SourceSpec {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("camera", dev)) if !dev.is_empty() => Ok(Self::Camera(dev.to_string())),
            Some(("dir", path)) if !path.is_empty() => Ok(Self::Directory(PathBuf::from(path))),
            Some(("file", path)) if !path.is_empty() => Ok(Self::File(PathBuf::from(path))),
            _ => Err(SourceError::BadSpec(s.to_string())),
        }
    }
}

impl SourceSpec {
    /// Build the frame source this spec names. Nothing is opened until `start`.
    pub fn open(&self) -> Result<Box<dyn FrameSource>, SourceError> {
        match self {
            Self::Directory(dir) => Ok(Box::new(ImageSequenceSource::from_dir(dir)?)),
            Self::File(path) => Ok(Box::new(ImageSequenceSource::new(vec![path.clone()])?)),
            #[cfg(feature = "v4l")]
            Self::Camera(device) => Ok(Box::new(crate::camera::CameraSource::new(device))),
            #[cfg(not(feature = "v4l"))]
            Self::Camera(device) => Err(SourceError::BadSpec(format!(
                "camera:{device} (built without the `v4l` feature)"
            ))),
        }
    }
}

/// Replays still images in name order, looping forever.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    sequence: u32,
    active: bool,
}

impl ImageSequenceSource {
    pub fn new(paths: Vec<PathBuf>) -> Result<Self, SourceError> {
        if paths.is_empty() {
            return Err(SourceError::NoImages("<empty list>".into()));
        }
        Ok(Self {
            paths,
            cursor: 0,
            sequence: 0,
            active: false,
        })
    }

    /// Collect every image file in `dir`, sorted by file name.
    pub fn from_dir(dir: &Path) -> Result<Self, SourceError> {
        let entries = std::fs::read_dir(dir).map_err(|source| SourceError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(SourceError::NoImages(dir.display().to_string()));
        }
        tracing::info!(dir = %dir.display(), count = paths.len(), "image sequence loaded");
        Self::new(paths)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn start(&mut self) -> Result<(), SourceError> {
        self.active = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<PixelFrame, SourceError> {
        if !self.active {
            return Err(SourceError::NotStarted);
        }
        let path = &self.paths[self.cursor];
        self.cursor = (self.cursor + 1) % self.paths.len();
        self.sequence = self.sequence.wrapping_add(1);

        let image = image::open(path).map_err(|source| SourceError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        Ok(PixelFrame::from_image(image.to_rgba8()).with_sequence(self.sequence))
    }

    fn stop(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn describe(&self) -> String {
        format!("image sequence ({} files)", self.paths.len())
    }
}

/// Stand-in for a source that could not be built. Never starts; `start`
/// reports why.
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl FrameSource for UnavailableSource {
    fn start(&mut self) -> Result<(), SourceError> {
        Err(SourceError::Unavailable(self.reason.clone()))
    }

    fn next_frame(&mut self) -> Result<PixelFrame, SourceError> {
        Err(SourceError::NotStarted)
    }

    fn stop(&mut self) {}

    fn is_active(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        format!("no video ({})", self.reason)
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
