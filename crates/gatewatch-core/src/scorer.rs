//! Texture/edge "faceness" heuristic for a square luminance window.
//!
//! Not a trained classifier: the score combines the window's luminance
//! variance with the fraction of pixels sitting on a strong gradient.

use crate::types::LuminanceBuffer;

/// Absolute horizontal + vertical difference above which a pixel counts as an edge.
pub const EDGE_THRESHOLD: i32 = 20;
/// Variance normalisation divisor.
pub const VARIANCE_SCALE: f64 = 10_000.0;
pub const VARIANCE_WEIGHT: f64 = 0.6;
pub const EDGE_WEIGHT: f64 = 0.4;

/// Score the square window with top-left `(x, y)` and side `size`.
///
/// A fractional `size` covers every pixel with `px < x + size`. Pixels
/// outside the buffer are excluded from every statistic; a window with no
/// in-bounds pixels scores 0. The score is unclamped.
pub fn score_region(buf: &LuminanceBuffer, x: usize, y: usize, size: f64) -> f64 {
    let (width, height) = (buf.width(), buf.height());
    let x_end = window_end(x, size, width);
    let y_end = window_end(y, size, height);

    if x >= x_end || y >= y_end {
        return 0.0;
    }

    let total = ((x_end - x) * (y_end - y)) as f64;

    let mut sum = 0u64;
    for py in y..y_end {
        for px in x..x_end {
            sum += buf.at(px, py) as u64;
        }
    }
    let mean = sum as f64 / total;

    let mut variance_sum = 0.0f64;
    let mut edge_pixels = 0usize;
    for py in y..y_end {
        let interior_row = py > 0 && py + 1 < height;
        for px in x..x_end {
            let value = buf.at(px, py);
            let d = value as f64 - mean;
            variance_sum += d * d;

            if interior_row && px > 0 && px + 1 < width {
                let gx = (value as i32 - buf.at(px + 1, py) as i32).abs();
                let gy = (value as i32 - buf.at(px, py + 1) as i32).abs();
                if gx + gy > EDGE_THRESHOLD {
                    edge_pixels += 1;
                }
            }
        }
    }

    let variance = variance_sum / total;
    let edge_ratio = edge_pixels as f64 / total;

    (variance / VARIANCE_SCALE) * VARIANCE_WEIGHT + edge_ratio * EDGE_WEIGHT
}

/// Exclusive end coordinate of a window along one axis, clipped to the buffer.
#[inline]
fn window_end(start: usize, size: f64, limit: usize) -> usize {
    let end = (start as f64 + size).ceil();
    if end <= 0.0 {
        return 0;
    }
    (end as usize).min(limit)
}
