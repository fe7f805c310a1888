//! Dashboard shell: the state the operator sees and the operations on it.
//!
//! All methods are synchronous; the outbound request itself runs elsewhere
//! and reports back through [`DashboardShell::finish_submit`].

use crate::channel::{ChannelSignal, ConnectionState};
use crate::registration::{AddPersonRequest, RegistrationError};
use gatewatch_core::{
    decode_preview_bytes, EventError, FaceVerdicts, NotificationHistory, RecognitionEvent,
};
use std::time::{Duration, Instant};

pub const CONNECTION_LOST: &str = "connection lost, reconnecting…";

/// Where the Add-Person dialog takes its vector and preview from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogSource {
    LastEvent,
    /// Notification history entry (0 = most recent).
    History(usize),
    /// Empty dialog.
    Blank,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddPersonDialog {
    pub vector: Option<Vec<f32>>,
    pub preview_image: Option<String>,
    pub name: String,
    pub submitting: bool,
}

/// Read-only projection for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusView {
    pub connection: String,
    pub last_event: Option<String>,
    pub history: Vec<String>,
    pub dialog: Option<DialogView>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogView {
    pub vector_len: Option<usize>,
    pub has_preview: bool,
    pub name: String,
    pub submitting: bool,
}

pub struct DashboardShell {
    connection: ConnectionState,
    last_event: Option<RecognitionEvent>,
    last_verdict: Option<(bool, Instant)>,
    history: NotificationHistory,
    dialog: Option<AddPersonDialog>,
    error: Option<String>,
    include_name: bool,
    verdict_ttl: Duration,
}

impl DashboardShell {
    pub fn new(history_capacity: usize, include_name: bool, verdict_ttl: Duration) -> Self {
        Self {
            connection: ConnectionState::Connecting,
            last_event: None,
            last_verdict: None,
            history: NotificationHistory::with_capacity(history_capacity),
            dialog: None,
            error: None,
            include_name,
            verdict_ttl,
        }
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn last_event(&self) -> Option<&RecognitionEvent> {
        self.last_event.as_ref()
    }

    pub fn history(&self) -> &NotificationHistory {
        &self.history
    }

    pub fn dialog(&self) -> Option<&AddPersonDialog> {
        self.dialog.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Consume one channel signal. Returns true when a new event was recorded.
    pub fn apply(&mut self, signal: ChannelSignal) -> bool {
        let next = self.connection.on_signal(&signal);
        if next != self.connection {
            tracing::info!(from = self.connection.label(), to = next.label(), "connection state");
        }
        let was_connected = self.connection == ConnectionState::Connected;
        self.connection = next;

        match signal {
            ChannelSignal::Message(text) => match RecognitionEvent::parse(&text) {
                Ok(event) => {
                    self.record(event);
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, len = text.len(), "dropping malformed event");
                    false
                }
            },
            ChannelSignal::Opened => {
                if self.error.as_deref() == Some(CONNECTION_LOST) {
                    self.error = None;
                }
                false
            }
            ChannelSignal::Closed(_) | ChannelSignal::Error(_) => {
                if was_connected {
                    self.error = Some(CONNECTION_LOST.to_string());
                }
                false
            }
            ChannelSignal::Connecting => false,
        }
    }

    fn record(&mut self, event: RecognitionEvent) {
        tracing::debug!(kind = ?event.kind(), summary = %event.summary(), "event received");
        if let Some(verdict) = event.verdict() {
            self.last_verdict = Some((verdict, Instant::now()));
        }
        self.last_event = Some(event.clone());
        self.history.push(event);
    }

    /// Remove exactly history entry `index`. Out of range is a no-op.
    pub fn dismiss(&mut self, index: usize) -> bool {
        self.history.dismiss(index).is_some()
    }

    /// Open the Add-Person dialog, pre-filled from `source` when it carries
    /// a vector or preview. Returns false if `source` names no event.
    pub fn request_add_person(&mut self, source: DialogSource) -> bool {
        let event = match source {
            DialogSource::LastEvent => self.last_event.as_ref(),
            DialogSource::History(i) => match self.history.get(i) {
                Some(event) => Some(event),
                None => return false,
            },
            DialogSource::Blank => None,
        };
        let dialog = AddPersonDialog {
            vector: event.and_then(|e| e.feature_vector()).map(<[f32]>::to_vec),
            preview_image: event.and_then(|e| e.preview_image()).map(str::to_string),
            ..AddPersonDialog::default()
        };
        tracing::info!(
            source = ?source,
            has_vector = dialog.vector.is_some(),
            "add-person dialog opened"
        );
        self.dialog = Some(dialog);
        true
    }

    pub fn set_name(&mut self, name: &str) -> bool {
        match self.dialog.as_mut() {
            Some(dialog) => {
                dialog.name = name.trim().to_string();
                true
            }
            None => false,
        }
    }

    /// Close the dialog. Ignored while a submission is in flight.
    pub fn cancel_dialog(&mut self) -> bool {
        match &self.dialog {
            Some(d) if !d.submitting => {
                self.dialog = None;
                true
            }
            _ => false,
        }
    }

    /// Start a submission. `None` if there is no dialog, one is already in
    /// flight, or the dialog has no vector (which sets the error).
    pub fn begin_submit(&mut self) -> Option<AddPersonRequest> {
        let include_name = self.include_name;
        let dialog = self.dialog.as_mut()?;
        if dialog.submitting {
            tracing::debug!("add-person already in flight");
            return None;
        }
        let Some(vector) = dialog.vector.clone() else {
            self.error = Some(format!("Failed to add person: {}", RegistrationError::MissingVector));
            return None;
        };
        dialog.submitting = true;
        let name = include_name.then(|| dialog.name.clone());
        Some(AddPersonRequest::new(vector).with_name(name))
    }

    /// Outcome of the submission started by [`Self::begin_submit`].
    pub fn finish_submit(&mut self, result: Result<(), RegistrationError>) {
        let Some(dialog) = self.dialog.as_mut() else {
            return;
        };
        dialog.submitting = false;
        match result {
            Ok(()) => {
                self.dialog = None;
                self.error = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "add-person failed");
                self.error = Some(format!("Failed to add person: {e}"));
            }
        }
    }

    /// JPEG bytes of the dialog's preview image, if any.
    pub fn dialog_preview_jpeg(&self) -> Result<Option<Vec<u8>>, EventError> {
        match self.dialog.as_ref().and_then(|d| d.preview_image.as_deref()) {
            Some(encoded) => Ok(Some(decode_preview_bytes(encoded)?)),
            None => Ok(None),
        }
    }

    /// Overlay lookup: the latest verdict applies to the primary face while fresh.
    pub fn overlay_verdicts(&self, now: Instant) -> FaceVerdicts {
        let mut verdicts = FaceVerdicts::new();
        if let Some((verdict, at)) = self.last_verdict {
            if now.saturating_duration_since(at) <= self.verdict_ttl {
                verdicts.insert(0, verdict);
            }
        }
        verdicts
    }

    pub fn status_view(&self) -> StatusView {
        StatusView {
            connection: self.connection.label().to_string(),
            last_event: self.last_event.as_ref().map(RecognitionEvent::summary),
            history: self
                .history
                .iter()
                .map(|e| format!("{} {}", e.timestamp.format("%H:%M:%S"), e.summary()))
                .collect(),
            dialog: self.dialog.as_ref().map(|d| DialogView {
                vector_len: d.vector.as_ref().map(Vec::len),
                has_preview: d.preview_image.is_some(),
                name: d.name.clone(),
                submitting: d.submitting,
            }),
            error: self.error.clone(),
        }
    }
}
