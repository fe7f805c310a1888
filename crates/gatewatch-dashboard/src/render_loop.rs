//! Per-tick video pipeline: sample → detect → overlay.

use gatewatch_core::{
    plan_overlay, DetectedFace, FaceDetector, FaceVerdicts, OverlayLabel, OverlaySurface,
};
use gatewatch_hw::{FrameSource, SourceError};
use std::path::PathBuf;

/// Summary of one completed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub sequence: u32,
    pub faces: usize,
    pub known: usize,
    pub unknown: usize,
}

/// Periodic composited-frame dump.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub path: PathBuf,
    pub every: u32,
}

pub struct RenderLoop {
    source: Box<dyn FrameSource>,
    detector: FaceDetector,
    surface: OverlaySurface,
    faces: Vec<DetectedFace>,
    ticks: u64,
    snapshot: Option<Snapshot>,
}

impl RenderLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: FaceDetector,
        surface: OverlaySurface,
    ) -> Self {
        Self {
            source,
            detector,
            surface,
            faces: Vec::new(),
            ticks: 0,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Option<Snapshot>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn start(&mut self) -> Result<(), SourceError> {
        self.source.start()?;
        tracing::info!(source = %self.source.describe(), "video started");
        Ok(())
    }

    /// Stop ticking and release the frame source.
    pub fn stop(&mut self) {
        if self.source.is_active() {
            self.source.stop();
            tracing::info!("video stopped");
        }
        self.faces.clear();
        self.surface.clear();
    }

    pub fn is_streaming(&self) -> bool {
        self.source.is_active()
    }

    /// Faces found on the last completed tick.
    pub fn faces(&self) -> &[DetectedFace] {
        &self.faces
    }

    pub fn surface(&self) -> &OverlaySurface {
        &self.surface
    }

    /// Run one tick. `None` when not streaming or the frame could not be read.
    pub fn tick(&mut self, verdicts: &FaceVerdicts) -> Option<TickReport> {
        if !self.source.is_active() {
            return None;
        }
        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "skipping tick: frame unavailable");
                return None;
            }
        };

        self.surface.resize(frame.width(), frame.height());
        self.faces = self.detector.detect_frame(&frame);
        let items = plan_overlay(&self.faces, verdicts);
        self.surface.render(&items);
        self.ticks += 1;

        if let Some(snapshot) = &self.snapshot {
            if self.ticks % u64::from(snapshot.every.max(1)) == 0 {
                match self.surface.save_composite(&frame, &snapshot.path) {
                    Ok(()) => tracing::debug!(path = %snapshot.path.display(), "snapshot written"),
                    Err(e) => tracing::warn!(path = %snapshot.path.display(), error = %e, "snapshot failed"),
                }
            }
        }

        let count = |label: OverlayLabel| items.iter().filter(|i| i.label == label).count();
        let report = TickReport {
            sequence: frame.sequence,
            faces: items.len(),
            known: count(OverlayLabel::Known),
            unknown: count(OverlayLabel::Unknown),
        };
        tracing::trace!(?report, "tick");
        Some(report)
    }
}
