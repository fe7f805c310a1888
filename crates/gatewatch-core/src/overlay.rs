//! Overlay renderer: bounding boxes and labels on a transparent layer.
//!
//! [`plan_overlay`] is a pure projection of the frame's faces and the
//! recognition lookup; [`OverlaySurface::render`] rasterises a plan after
//! clearing whatever the previous tick drew.

use crate::types::{DetectedFace, PixelFrame};
use ab_glyph::{FontVec, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub const COLOR_MATCH: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const COLOR_UNKNOWN: Rgba<u8> = Rgba([255, 0, 0, 255]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const LINE_WIDTH: u32 = 2;
const LABEL_HEIGHT: u32 = 16;
const LABEL_GAP: u32 = 2;
const LABEL_FONT_PX: f32 = 14.0;
const LABEL_TEXT: Rgba<u8> = Rgba([0, 0, 0, 255]);
const GLYPH_SCALE: u32 = 2;
const GLYPH_ADVANCE: u32 = 6 * GLYPH_SCALE;
const TAG_PAD: u32 = 4;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to read font {path}: {source}")]
    FontRead {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid font file: {0}")]
    InvalidFont(String),
    #[error("failed to write overlay image: {0}")]
    Save(#[from] image::ImageError),
}

/// Recognition lookup: face index in the current frame → recognized flag.
pub type FaceVerdicts = HashMap<usize, bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayLabel {
    /// No recognition result for this face.
    Detected,
    Known,
    Unknown,
}

impl OverlayLabel {
    pub fn from_verdict(verdict: Option<bool>) -> Self {
        match verdict {
            None => Self::Detected,
            Some(true) => Self::Known,
            Some(false) => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "DETECTED",
            Self::Known => "KNOWN",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn color(&self) -> Rgba<u8> {
        match self {
            Self::Detected | Self::Known => COLOR_MATCH,
            Self::Unknown => COLOR_UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayItem {
    pub face: DetectedFace,
    pub label: OverlayLabel,
}

/// Build the draw list for one frame.
pub fn plan_overlay(faces: &[DetectedFace], verdicts: &FaceVerdicts) -> Vec<OverlayItem> {
    faces
        .iter()
        .enumerate()
        .map(|(i, face)| OverlayItem {
            face: *face,
            label: OverlayLabel::from_verdict(verdicts.get(&i).copied()),
        })
        .collect()
}

/// Load a TrueType/OpenType font for label text.
pub fn load_font(path: &Path) -> Result<FontVec, OverlayError> {
    let bytes = std::fs::read(path).map_err(|source| OverlayError::FontRead {
        path: path.display().to_string(),
        source,
    })?;
    FontVec::try_from_vec(bytes).map_err(|e| OverlayError::InvalidFont(e.to_string()))
}

/// Transparent RGBA layer drawn above the video.
pub struct OverlaySurface {
    layer: RgbaImage,
    font: Option<FontVec>,
}

impl OverlaySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            layer: RgbaImage::from_pixel(width, height, TRANSPARENT),
            font: None,
        }
    }

    /// Draw label text with `font` instead of the built-in block letters.
    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.layer.dimensions()
    }

    pub fn layer(&self) -> &RgbaImage {
        &self.layer
    }

    /// Match the surface to the current frame size, discarding its contents.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.layer.dimensions() != (width, height) {
            self.layer = RgbaImage::from_pixel(width, height, TRANSPARENT);
        }
    }

    pub fn clear(&mut self) {
        for px in self.layer.pixels_mut() {
            *px = TRANSPARENT;
        }
    }

    /// Clear the surface, then draw every item.
    pub fn render(&mut self, items: &[OverlayItem]) {
        self.clear();
        for item in items {
            self.draw_item(item);
        }
    }

    fn draw_item(&mut self, item: &OverlayItem) {
        let (width, height) = self.layer.dimensions();
        let color = item.label.color();

        let x = item.face.x.max(0.0).round() as i32;
        let y = item.face.y.max(0.0).round() as i32;
        let w = item.face.width.round() as u32;
        let h = item.face.height.round() as u32;

        for t in 0..LINE_WIDTH {
            let inner_w = w.saturating_sub(2 * t);
            let inner_h = h.saturating_sub(2 * t);
            if inner_w > 0 && inner_h > 0 {
                let rect = Rect::at(x + t as i32, y + t as i32).of_size(inner_w, inner_h);
                draw_hollow_rect_mut(&mut self.layer, rect, color);
            }
        }

        // Tag above the box, or below it when there is no room.
        let label = item.label.as_str();
        let tag_y = if y as u32 >= LABEL_HEIGHT + LABEL_GAP {
            y as u32 - LABEL_HEIGHT - LABEL_GAP
        } else {
            y as u32 + h + LABEL_GAP
        };
        if tag_y >= height || x as u32 >= width {
            return;
        }

        match &self.font {
            Some(font) => {
                draw_text_mut(
                    &mut self.layer,
                    color,
                    x,
                    tag_y as i32,
                    PxScale::from(LABEL_FONT_PX),
                    font,
                    label,
                );
            }
            None => self.draw_tag(label, x, tag_y as i32, color),
        }
    }

    /// Coloured tag with the label in 5x7 block letters.
    fn draw_tag(&mut self, label: &str, x: i32, y: i32, color: Rgba<u8>) {
        let tag_w = 2 * TAG_PAD + label.len() as u32 * GLYPH_ADVANCE - GLYPH_SCALE;
        draw_filled_rect_mut(&mut self.layer, Rect::at(x, y).of_size(tag_w, LABEL_HEIGHT), color);

        let text_y = y + ((LABEL_HEIGHT - 7 * GLYPH_SCALE) / 2) as i32;
        for (i, c) in label.chars().enumerate() {
            let Some(rows) = glyph(c) else { continue };
            let left = x + (TAG_PAD + i as u32 * GLYPH_ADVANCE) as i32;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..5 {
                    if bits & (0b10000 >> col) != 0 {
                        let px = Rect::at(
                            left + (col * GLYPH_SCALE) as i32,
                            text_y + (row as u32 * GLYPH_SCALE) as i32,
                        )
                        .of_size(GLYPH_SCALE, GLYPH_SCALE);
                        draw_filled_rect_mut(&mut self.layer, px, LABEL_TEXT);
                    }
                }
            }
        }
    }

    /// Alpha-blend the overlay onto a copy of `frame`.
    pub fn composite(&self, frame: &PixelFrame) -> RgbaImage {
        let mut base = frame.to_image();
        image::imageops::overlay(&mut base, &self.layer, 0, 0);
        base
    }

    /// Composite onto `frame` and save as an image file (format from extension).
    pub fn save_composite(&self, frame: &PixelFrame, path: &Path) -> Result<(), OverlayError> {
        self.composite(frame).save(path)?;
        Ok(())
    }
}

/// 5x7 rows, most significant of the low five bits leftmost. Covers the
/// letters of the overlay labels.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f64, y: f64, size: f64) -> DetectedFace {
        DetectedFace { x, y, width: size, height: size, score: 0.9 }
    }

    #[test]
    fn test_label_from_verdict() {
        assert_eq!(OverlayLabel::from_verdict(None).as_str(), "DETECTED");
        assert_eq!(OverlayLabel::from_verdict(Some(true)).as_str(), "KNOWN");
        assert_eq!(OverlayLabel::from_verdict(Some(false)).as_str(), "UNKNOWN");
        assert_eq!(OverlayLabel::Detected.color(), COLOR_MATCH);
        assert_eq!(OverlayLabel::Known.color(), COLOR_MATCH);
        assert_eq!(OverlayLabel::Unknown.color(), COLOR_UNKNOWN);
    }

    #[test]
    fn test_plan_uses_lookup_by_index() {
        let faces = [face(0.0, 0.0, 10.0), face(20.0, 0.0, 10.0), face(40.0, 0.0, 10.0)];
        let verdicts = FaceVerdicts::from([(1, false), (2, true)]);
        let plan = plan_overlay(&faces, &verdicts);
        let labels: Vec<_> = plan.iter().map(|i| i.label).collect();
        assert_eq!(
            labels,
            vec![OverlayLabel::Detected, OverlayLabel::Unknown, OverlayLabel::Known]
        );
        assert_eq!(plan[1].face, faces[1]);
    }

    #[test]
    fn test_render_strokes_two_pixel_border() {
        let mut surface = OverlaySurface::new(100, 100);
        surface.render(&plan_overlay(&[face(30.0, 30.0, 20.0)], &FaceVerdicts::new()));
        let layer = surface.layer();
        assert_eq!(*layer.get_pixel(30, 40), COLOR_MATCH);
        assert_eq!(*layer.get_pixel(31, 40), COLOR_MATCH);
        assert_eq!(*layer.get_pixel(32, 40), TRANSPARENT);
        assert_eq!(*layer.get_pixel(49, 40), COLOR_MATCH);
        assert_eq!(*layer.get_pixel(40, 40), TRANSPARENT);
    }

    #[test]
    fn test_unknown_face_is_red_with_tag_above() {
        let mut surface = OverlaySurface::new(100, 100);
        let verdicts = FaceVerdicts::from([(0, false)]);
        surface.render(&plan_overlay(&[face(30.0, 40.0, 20.0)], &verdicts));
        let layer = surface.layer();
        assert_eq!(*layer.get_pixel(30, 45), COLOR_UNKNOWN);
        // Tag occupies y in [22, 38).
        assert_eq!(*layer.get_pixel(32, 25), COLOR_UNKNOWN);
    }

    #[test]
    fn test_tag_moves_below_box_at_top_edge() {
        let mut surface = OverlaySurface::new(100, 100);
        surface.render(&plan_overlay(&[face(10.0, 0.0, 20.0)], &FaceVerdicts::new()));
        // Box spans y 0..20, tag starts at y 22.
        assert_eq!(*surface.layer().get_pixel(12, 25), COLOR_MATCH);
    }

    #[test]
    fn test_render_clears_previous_tick() {
        let mut surface = OverlaySurface::new(100, 100);
        surface.render(&plan_overlay(&[face(10.0, 10.0, 20.0)], &FaceVerdicts::new()));
        assert_eq!(*surface.layer().get_pixel(10, 20), COLOR_MATCH);

        surface.render(&plan_overlay(&[face(60.0, 60.0, 20.0)], &FaceVerdicts::new()));
        assert_eq!(*surface.layer().get_pixel(10, 20), TRANSPARENT);
        assert_eq!(*surface.layer().get_pixel(60, 70), COLOR_MATCH);

        surface.render(&[]);
        assert!(surface.layer().pixels().all(|p| *p == TRANSPARENT));
    }

    #[test]
    fn test_box_past_surface_edge_is_clipped() {
        let mut surface = OverlaySurface::new(40, 40);
        surface.render(&plan_overlay(&[face(30.0, 30.0, 20.0)], &FaceVerdicts::new()));
        assert_eq!(*surface.layer().get_pixel(30, 35), COLOR_MATCH);
    }

    #[test]
    fn test_composite_keeps_video_outside_boxes() {
        let frame = PixelFrame::from_image(RgbaImage::from_pixel(50, 50, Rgba([9, 9, 9, 255])));
        let mut surface = OverlaySurface::new(50, 50);
        surface.render(&plan_overlay(&[face(20.0, 20.0, 10.0)], &FaceVerdicts::new()));
        let out = surface.composite(&frame);
        assert_eq!(out.get_pixel(0, 0).0, [9, 9, 9, 255]);
        assert_eq!(out.get_pixel(20, 25).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_resize_discards_contents() {
        let mut surface = OverlaySurface::new(10, 10);
        surface.resize(20, 30);
        assert_eq!(surface.dimensions(), (20, 30));
    }

    #[test]
    fn test_default_tag_spells_label() {
        let mut surface = OverlaySurface::new(200, 100);
        let verdicts = FaceVerdicts::from([(0, true)]);
        surface.render(&plan_overlay(&[face(30.0, 40.0, 20.0)], &verdicts));
        let layer = surface.layer();

        // Tag spans y [22, 38); "KNOWN" starts 4px in, glyph rows from y 23.
        // K's left stem is set on every row, its middle column is not.
        assert_eq!(*layer.get_pixel(34, 23), LABEL_TEXT);
        assert_eq!(*layer.get_pixel(35, 36), LABEL_TEXT);
        assert_eq!(*layer.get_pixel(38, 23), COLOR_MATCH);
        // Padding after the last letter stays tag-coloured.
        let tag_end = 30 + 2 * TAG_PAD + 5 * GLYPH_ADVANCE - GLYPH_SCALE;
        assert_eq!(*layer.get_pixel(tag_end - 1, 30), COLOR_MATCH);
        assert_eq!(*layer.get_pixel(tag_end, 30), TRANSPARENT);

        let text = (30..tag_end)
            .flat_map(|x| (22..38).map(move |y| (x, y)))
            .filter(|&(x, y)| *layer.get_pixel(x, y) == LABEL_TEXT)
            .count();
        assert!(text > 50, "only {text} text pixels");
    }

    #[test]
    fn test_every_label_letter_has_a_glyph() {
        for label in [OverlayLabel::Detected, OverlayLabel::Known, OverlayLabel::Unknown] {
            assert!(label.as_str().chars().all(|c| glyph(c).is_some()), "{label:?}");
        }
        assert!(glyph('?').is_none());
    }

    #[test]
    fn test_load_font_rejects_missing_file() {
        let err = load_font(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(matches!(err, OverlayError::FontRead { .. }));
    }
}
