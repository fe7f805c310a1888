//! Multi-scale sliding-window face detector.
//!
//! Mirrors the shape of a cascade classifier's `detectMultiScale`: a geometric
//! scale pyramid, a per-window score (see [`crate::scorer`]), a minimum
//! neighbour count, and overlap suppression. Each call is a fresh pass with no
//! state carried between frames.

use crate::grayscale::to_luminance;
use crate::scorer::score_region;
use crate::types::{CandidateWindow, DetectedFace, LuminanceBuffer, PixelFrame};

// --- Named constants (no magic numbers) ---
const MIN_SIZE_DIVISOR: f64 = 6.0;
const MAX_SIZE_DIVISOR: f64 = 2.0;
const SCALE_FACTOR: f64 = 1.1;
const STEP_DIVISOR: f64 = 4.0;
const CANDIDATE_THRESHOLD: f64 = 0.6;
const NEIGHBOR_THRESHOLD: f64 = 0.5;
const NEIGHBOR_RADIUS_DIVISOR: f64 = 8.0;
const MIN_NEIGHBORS: usize = 5;
const OVERLAP_THRESHOLD: f64 = 0.3;
/// Frames whose shorter side is below this yield no detections.
const MIN_FRAME_SIDE: usize = 6;

/// Tunables for one detection pass. `Default` matches the classic
/// `scaleFactor = 1.1`, `minNeighbors = 5` configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorParams {
    /// Smallest window is `min(W, H) / min_size_divisor`.
    pub min_size_divisor: f64,
    /// Largest window is `min(W, H) / max_size_divisor`.
    pub max_size_divisor: f64,
    pub scale_factor: f64,
    /// Sliding step is `floor(size / step_divisor)`, at least 1.
    pub step_divisor: f64,
    /// A window becomes a candidate when its score is strictly above this.
    pub candidate_threshold: f64,
    /// A neighbour supports a candidate when its score is strictly above this.
    pub neighbor_threshold: f64,
    /// Neighbourhood radius is `floor(size / neighbor_radius_divisor)`.
    pub neighbor_radius_divisor: f64,
    pub min_neighbors: usize,
    /// Candidates with IoU strictly above this against an accepted face are dropped.
    pub overlap_threshold: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_size_divisor: MIN_SIZE_DIVISOR,
            max_size_divisor: MAX_SIZE_DIVISOR,
            scale_factor: SCALE_FACTOR,
            step_divisor: STEP_DIVISOR,
            candidate_threshold: CANDIDATE_THRESHOLD,
            neighbor_threshold: NEIGHBOR_THRESHOLD,
            neighbor_radius_divisor: NEIGHBOR_RADIUS_DIVISOR,
            min_neighbors: MIN_NEIGHBORS,
            overlap_threshold: OVERLAP_THRESHOLD,
        }
    }
}

/// Heuristic face detector used for the live overlay.
#[derive(Debug, Clone, Default)]
pub struct FaceDetector {
    params: DetectorParams,
}

impl FaceDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Convert an RGBA frame to luminance and detect faces in it.
    pub fn detect_frame(&self, frame: &PixelFrame) -> Vec<DetectedFace> {
        self.detect(&to_luminance(frame))
    }

    /// Detect faces in a luminance buffer.
    ///
    /// Faces are returned in discovery order: ascending window size, then
    /// ascending `y`, then ascending `x`. Identical input always yields an
    /// identical result.
    pub fn detect(&self, buf: &LuminanceBuffer) -> Vec<DetectedFace> {
        let mut faces: Vec<DetectedFace> = Vec::new();
        let mut candidates = 0usize;
        let mut corroborated = 0usize;

        for size in self.scale_pyramid(buf.width(), buf.height()) {
            let step = self.step_for(size);

            for (x, y) in window_origins(buf, size, step) {
                let score = score_region(buf, x, y, size);
                if score <= self.params.candidate_threshold {
                    continue;
                }
                candidates += 1;

                let window = CandidateWindow { x, y, size, score };
                if self.neighbor_support(buf, &window) < self.params.min_neighbors {
                    continue;
                }
                corroborated += 1;

                let face = DetectedFace::from(window);
                if accept_if_distinct(&mut faces, face, self.params.overlap_threshold) {
                    tracing::trace!(x, y, size, score, "face accepted");
                }
            }
        }

        tracing::debug!(
            width = buf.width(),
            height = buf.height(),
            candidates,
            corroborated,
            faces = faces.len(),
            "detection pass complete"
        );

        faces
    }

    /// Window sizes for a `width × height` buffer, smallest first.
    ///
    /// Empty when the shorter side is below six pixels.
    pub fn scale_pyramid(&self, width: usize, height: usize) -> Vec<f64> {
        let side = width.min(height);
        if side < MIN_FRAME_SIDE || self.params.scale_factor <= 1.0 {
            return Vec::new();
        }

        let max_size = side as f64 / self.params.max_size_divisor;
        let mut size = side as f64 / self.params.min_size_divisor;
        let mut sizes = Vec::new();
        while size <= max_size {
            sizes.push(size);
            size *= self.params.scale_factor;
        }
        sizes
    }

    fn step_for(&self, size: f64) -> usize {
        ((size / self.params.step_divisor).floor() as usize).max(1)
    }

    /// Count neighbouring windows of the same size that score above the
    /// neighbour threshold.
    ///
    /// The neighbourhood is the square of radius `r = floor(size / 8)`
    /// around the candidate origin, sampled every `max(1, r / 2)` pixels on
    /// both axes. Origins that would place the window outside the sliding
    /// range are skipped.
    fn neighbor_support(&self, buf: &LuminanceBuffer, window: &CandidateWindow) -> usize {
        let radius = (window.size / self.params.neighbor_radius_divisor).floor() as usize;
        if radius == 0 {
            return 0;
        }
        let stride = (radius / 2).max(1);
        let reach = (radius / stride) as isize;

        let mut count = 0usize;
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let Some(nx) = offset(window.x, dx * stride as isize) else {
                    continue;
                };
                let Some(ny) = offset(window.y, dy * stride as isize) else {
                    continue;
                };
                if !is_valid_origin(buf, nx, ny, window.size) {
                    continue;
                }
                if score_region(buf, nx, ny, window.size) > self.params.neighbor_threshold {
                    count += 1;
                }
            }
        }
        count
    }
}

/// Sliding-window origins for one scale, row-major.
fn window_origins(
    buf: &LuminanceBuffer,
    size: f64,
    step: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let x_limit = buf.width() as f64 - size;
    let y_limit = buf.height() as f64 - size;
    (0..)
        .step_by(step)
        .take_while(move |&y| (y as f64) < y_limit)
        .flat_map(move |y| {
            (0..)
                .step_by(step)
                .take_while(move |&x| (x as f64) < x_limit)
                .map(move |x| (x, y))
        })
}

#[inline]
fn is_valid_origin(buf: &LuminanceBuffer, x: usize, y: usize, size: f64) -> bool {
    (x as f64) < buf.width() as f64 - size && (y as f64) < buf.height() as f64 - size
}

#[inline]
fn offset(base: usize, delta: isize) -> Option<usize> {
    base.checked_add_signed(delta)
}

/// Push `face` unless it overlaps an already-accepted face by more than
/// `threshold` IoU. Returns whether it was accepted.
fn accept_if_distinct(faces: &mut Vec<DetectedFace>, face: DetectedFace, threshold: f64) -> bool {
    if faces.iter().any(|existing| face.iou(existing) > threshold) {
        return false;
    }
    faces.push(face);
    true
}
