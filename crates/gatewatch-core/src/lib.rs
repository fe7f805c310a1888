//! gatewatch-core — Heuristic face detection and recognition-event model.
//!
//! The detection pipeline (grayscale conversion, region scoring, multi-scale
//! detection) drives the live video overlay; the event model and bounded
//! history back the dashboard's notification list.

pub mod detector;
pub mod events;
pub mod grayscale;
pub mod history;
pub mod overlay;
pub mod scorer;
pub mod types;

pub use detector::{DetectorParams, FaceDetector};
pub use events::{
    decode_preview_bytes, EventError, EventKind, EventPayload, Recognition, RecognitionEvent,
};
pub use grayscale::to_luminance;
pub use history::{NotificationHistory, HISTORY_CAPACITY};
pub use overlay::{plan_overlay, FaceVerdicts, OverlayItem, OverlayLabel, OverlaySurface};
pub use types::{CandidateWindow, DetectedFace, FrameError, LuminanceBuffer, PixelFrame};
