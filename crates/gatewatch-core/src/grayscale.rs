//! RGBA → luminance conversion.

use crate::types::{LuminanceBuffer, PixelFrame};

// ITU-R BT.601 luma weights.
const LUMA_R: f64 = 0.299;
const LUMA_G: f64 = 0.587;
const LUMA_B: f64 = 0.114;

/// Luminance of a single RGB triple, rounded to the nearest integer.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = LUMA_R * r as f64 + LUMA_G * g as f64 + LUMA_B * b as f64;
    y.round().clamp(0.0, 255.0) as u8
}

/// Convert an RGBA frame into a luminance buffer of the same dimensions.
///
/// The alpha channel is ignored.
pub fn to_luminance(frame: &PixelFrame) -> LuminanceBuffer {
    let gray: Vec<u8> = frame
        .data()
        .chunks_exact(4)
        .map(|px| luma(px[0], px[1], px[2]))
        .collect();

    LuminanceBuffer::from_vec(frame.width(), frame.height(), gray)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma_primaries() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(255, 0, 0), 76); // 76.245
        assert_eq!(luma(0, 255, 0), 150); // 149.685
        assert_eq!(luma(0, 0, 255), 29); // 29.07
    }

    #[test]
    fn test_luma_rounds_to_nearest() {
        // 0.299*10 + 0.587*10 + 0.114*15 = 10.57
        assert_eq!(luma(10, 10, 15), 11);
    }

    #[test]
    fn test_to_luminance_preserves_dimensions_and_order() {
        // 2x1 frame: white, then pure green; alpha must not matter.
        let frame = PixelFrame::new(2, 1, vec![255, 255, 255, 0, 0, 255, 0, 128]).unwrap();
        let gray = to_luminance(&frame);
        assert_eq!((gray.width(), gray.height()), (2, 1));
        assert_eq!(gray.data(), &[255, 150]);
    }

    #[test]
    fn test_to_luminance_empty_frame() {
        let frame = PixelFrame::new(0, 0, Vec::new()).unwrap();
        let gray = to_luminance(&frame);
        assert!(gray.data().is_empty());
    }
}
