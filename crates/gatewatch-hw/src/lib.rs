//! gatewatch-hw — Frame sampling for the live overlay.
//!
//! Provides the [`FrameSource`] abstraction, an image-sequence replay source,
//! and (with the `v4l` feature) V4L2 camera capture.

#[cfg(feature = "v4l")]
pub mod camera;
pub mod frame;
pub mod source;

#[cfg(feature = "v4l")]
pub use camera::{Camera, CameraError, CameraSource, DeviceInfo};
pub use source::{FrameSource, ImageSequenceSource, SourceError, SourceSpec, UnavailableSource};
