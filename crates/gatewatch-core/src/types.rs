use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid buffer length for {width}x{height}: expected {expected}, got {actual}")]
    InvalidLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A captured RGBA video frame (row-major, 4 bytes per pixel).
///
/// Produced once per render tick and discarded after the detection pass.
#[derive(Debug, Clone)]
pub struct PixelFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
    /// Capture sequence number assigned by the frame source.
    pub sequence: u32,
}

impl PixelFrame {
    /// Wrap an RGBA buffer, rejecting buffers whose length does not match the dimensions.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
            sequence: 0,
        })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
            sequence: 0,
        }
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copy the frame into an `image` buffer.
    pub fn to_image(&self) -> RgbaImage {
        // Length was validated at construction.
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

/// Single-channel luminance buffer derived from a [`PixelFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuminanceBuffer {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl LuminanceBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width: width as usize,
            height: height as usize,
            data,
        })
    }

    /// Wrap a buffer whose length is known to match `width * height`.
    pub(crate) fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width: width as usize,
            height: height as usize,
            data,
        }
    }

    /// Build a buffer by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let (w, h) = (width as usize, height as usize);
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                data.push(f(x, y));
            }
        }
        Self {
            width: w,
            height: h,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Luminance at (x, y). Caller guarantees the coordinate is in bounds.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

/// A scored square window produced during one detection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateWindow {
    pub x: usize,
    pub y: usize,
    /// Side length; fractional because the scale pyramid is geometric.
    pub size: f64,
    pub score: f64,
}

/// A face bounding box that survived corroboration and overlap suppression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub score: f64,
}

impl DetectedFace {
    /// Intersection-over-Union with another box; 0 when they do not overlap.
    pub fn iou(&self, other: &DetectedFace) -> f64 {
        let left = self.x.max(other.x);
        let right = (self.x + self.width).min(other.x + other.width);
        let top = self.y.max(other.y);
        let bottom = (self.y + self.height).min(other.y + other.height);

        if left >= right || top >= bottom {
            return 0.0;
        }

        let intersection = (right - left) * (bottom - top);
        let union = self.width * self.height + other.width * other.height - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

impl From<CandidateWindow> for DetectedFace {
    fn from(w: CandidateWindow) -> Self {
        Self {
            x: w.x as f64,
            y: w.y as f64,
            width: w.size,
            height: w.size,
            score: w.score,
        }
    }
}
