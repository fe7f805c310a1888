//! V4L2 camera capture via the `v4l` crate.

use crate::frame;
use crate::source::{FrameSource, SourceError};
use gatewatch_core::PixelFrame;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const PREFERRED_WIDTH: u32 = 640;
const PREFERRED_HEIGHT: u32 = 480;
const MMAP_BUFFERS: u32 = 4;
const MAX_DEVICE_INDEX: u32 = 16;
const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no video device at {0}")]
    NotFound(String),
    #[error("{0} is in use by another process")]
    Busy(String),
    #[error("{path}: {message}")]
    Device { path: String, message: String },
    #[error("{0} cannot capture video")]
    NoCapture(String),
    #[error("no usable pixel format: {0}")]
    Format(String),
    #[error("capture failed: {0}")]
    Capture(String),
}

/// A capture device found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel layouts the dashboard can convert to RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Grey,
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            b"Y16 " | b"Y16\0" => Some(Self::Y16),
            _ => None,
        }
    }

    fn to_rgba(self, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
        let converted = match self {
            Self::Yuyv => frame::yuyv_to_rgba(buf, width, height),
            Self::Grey => frame::grey_to_rgba(buf, width, height),
            Self::Y16 => frame::y16_to_rgba(buf, width, height),
        };
        converted.map_err(|e| CameraError::Capture(format!("{self:?} buffer: {e}")))
    }
}

/// An open V4L2 device with a negotiated colour format.
pub struct Camera {
    device: Device,
    path: String,
    pub width: u32,
    pub height: u32,
    format: PixelFormat,
}

impl Camera {
    /// Open `path` (e.g. "/dev/video0") and ask for 640x480 YUYV. Drivers
    /// that only offer GREY or Y16 are accepted as well.
    pub fn open(path: &str) -> Result<Self, CameraError> {
        if !Path::new(path).exists() {
            return Err(CameraError::NotFound(path.to_string()));
        }

        let device = Device::with_path(path).map_err(|e| match e.raw_os_error() {
            Some(EBUSY) => CameraError::Busy(path.to_string()),
            _ => CameraError::Device {
                path: path.to_string(),
                message: e.to_string(),
            },
        })?;

        let caps = device.query_caps().map_err(|e| CameraError::Device {
            path: path.to_string(),
            message: format!("query capabilities: {e}"),
        })?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NoCapture(path.to_string()));
        }
        tracing::info!(device = path, card = %caps.card, driver = %caps.driver, "camera opened");

        let (width, height, format) = negotiate(&device)?;
        Ok(Self {
            device,
            path: path.to_string(),
            width,
            height,
            format,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    fn stream(&self) -> Result<MmapStream<'static>, CameraError> {
        MmapStream::with_buffers(&self.device, BufType::VideoCapture, MMAP_BUFFERS)
            .map_err(|e| CameraError::Capture(format!("mmap stream: {e}")))
    }

    /// Capture devices among `/dev/video0` .. `/dev/video15`.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_DEVICE_INDEX)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

fn negotiate(device: &Device) -> Result<(u32, u32, PixelFormat), CameraError> {
    let mut wanted = device
        .format()
        .map_err(|e| CameraError::Format(format!("read current format: {e}")))?;
    wanted.fourcc = FourCC::new(b"YUYV");
    wanted.width = PREFERRED_WIDTH;
    wanted.height = PREFERRED_HEIGHT;

    let got = device
        .set_format(&wanted)
        .map_err(|e| CameraError::Format(format!("set format: {e}")))?;
    let format = PixelFormat::from_fourcc(got.fourcc)
        .ok_or_else(|| CameraError::Format(format!("driver offered {:?}", got.fourcc)))?;

    tracing::info!(width = got.width, height = got.height, format = ?format, "format negotiated");
    Ok((got.width, got.height, format))
}

/// Live camera as a [`FrameSource`]. The device is opened on `start` and
/// closed on `stop`, so stopping the stream releases the camera.
pub struct CameraSource {
    path: String,
    camera: Option<Camera>,
    stream: Option<MmapStream<'static>>,
}

impl CameraSource {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            camera: None,
            stream: None,
        }
    }
}

impl FrameSource for CameraSource {
    fn start(&mut self) -> Result<(), SourceError> {
        if self.stream.is_none() {
            let camera = Camera::open(&self.path)?;
            self.stream = Some(camera.stream()?);
            self.camera = Some(camera);
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<PixelFrame, SourceError> {
        let (Some(camera), Some(stream)) = (&self.camera, &mut self.stream) else {
            return Err(SourceError::NotStarted);
        };
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::Capture(format!("dequeue: {e}")))?;
        let rgba = camera.format.to_rgba(buf, camera.width, camera.height)?;
        Ok(PixelFrame::new(camera.width, camera.height, rgba)?.with_sequence(meta.sequence))
    }

    fn stop(&mut self) {
        // Stream first: its buffers are mapped from the device.
        self.stream = None;
        if self.camera.take().is_some() {
            tracing::info!(device = %self.path, "camera released");
        }
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    fn describe(&self) -> String {
        match &self.camera {
            Some(c) => format!("camera {} ({}x{} {:?})", c.path, c.width, c.height, c.format),
            None => format!("camera {} (closed)", self.path),
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}
