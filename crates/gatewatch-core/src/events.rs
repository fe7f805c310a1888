//! Recognition events pushed by the backend over the event feed.
//!
//! Wire shape: `{ "event_type": ..., "timestamp": ..., "data": { ... } }`.
//! The timestamp may be an ISO-8601 string or epoch milliseconds; when it is
//! missing the receive time is used.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("malformed event JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("recognition event is missing `{0}`")]
    MissingField(&'static str),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("preview image is not valid base64: {0}")]
    PreviewEncoding(#[from] base64::DecodeError),
    #[error("preview image could not be decoded: {0}")]
    PreviewImage(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Recognition,
    PersonAdded,
    VisitUpdated,
}

/// Outcome of a recognition attempt reported by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    Known {
        person_id: String,
        person_name: Option<String>,
        /// Match confidence in [0, 1].
        confidence: f32,
        device_id: Option<String>,
    },
    Unknown {
        /// Base64-encoded JPEG still of the unknown face.
        preview_image: Option<String>,
        /// Feature vector to submit when registering this face.
        vector: Option<Vec<f32>>,
        device_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Recognition(Recognition),
    PersonAdded { status: Option<String> },
    VisitUpdated {
        person_id: Option<String>,
        status: Option<String>,
    },
}

/// One immutable event received from the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionEvent {
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

// --- Wire representation ---

#[derive(Deserialize)]
struct WireEvent {
    event_type: EventKind,
    #[serde(default)]
    timestamp: Option<WireTimestamp>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Text(String),
    EpochMillis(f64),
}

/// Person identifiers arrive as strings or integers depending on the backend store.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(serde_json::Number),
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(s) => s,
            WireId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct WireRecognition {
    #[serde(default)]
    recognized: bool,
    person_id: Option<WireId>,
    person_name: Option<String>,
    confidence: Option<f32>,
    preview_image: Option<String>,
    vector: Option<Vec<f32>>,
    device_id: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireStatus {
    status: Option<String>,
    person_id: Option<WireId>,
}

impl RecognitionEvent {
    /// Parse one feed message, stamping it with the current time if it carries none.
    pub fn parse(text: &str) -> Result<Self, EventError> {
        Self::parse_at(text, Utc::now())
    }

    /// Parse one feed message; `received_at` is used when the message has no timestamp.
    pub fn parse_at(text: &str, received_at: DateTime<Utc>) -> Result<Self, EventError> {
        let wire: WireEvent = serde_json::from_str(text)?;

        let timestamp = match wire.timestamp {
            Some(ts) => parse_timestamp(ts)?,
            None => received_at,
        };

        let payload = match wire.event_type {
            EventKind::Recognition => {
                let data: WireRecognition = serde_json::from_value(wire.data)?;
                EventPayload::Recognition(recognition_from_wire(data)?)
            }
            EventKind::PersonAdded => {
                let data: WireStatus = status_from_value(wire.data)?;
                EventPayload::PersonAdded {
                    status: data.status,
                }
            }
            EventKind::VisitUpdated => {
                let data: WireStatus = status_from_value(wire.data)?;
                EventPayload::VisitUpdated {
                    person_id: data.person_id.map(String::from),
                    status: data.status,
                }
            }
        };

        Ok(Self { timestamp, payload })
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Recognition(_) => EventKind::Recognition,
            EventPayload::PersonAdded { .. } => EventKind::PersonAdded,
            EventPayload::VisitUpdated { .. } => EventKind::VisitUpdated,
        }
    }

    pub fn recognition(&self) -> Option<&Recognition> {
        match &self.payload {
            EventPayload::Recognition(r) => Some(r),
            _ => None,
        }
    }

    /// `Some(true)` for a known face, `Some(false)` for an unknown one,
    /// `None` for non-recognition events.
    pub fn verdict(&self) -> Option<bool> {
        self.recognition()
            .map(|r| matches!(r, Recognition::Known { .. }))
    }

    /// Feature vector of an unknown face, if the backend supplied one.
    pub fn feature_vector(&self) -> Option<&[f32]> {
        match self.recognition()? {
            Recognition::Unknown {
                vector: Some(v), ..
            } => Some(v),
            _ => None,
        }
    }

    pub fn preview_image(&self) -> Option<&str> {
        match self.recognition()? {
            Recognition::Unknown {
                preview_image: Some(p),
                ..
            } => Some(p),
            _ => None,
        }
    }

    /// Raw JPEG bytes of the unknown-face preview.
    pub fn preview_jpeg(&self) -> Result<Option<Vec<u8>>, EventError> {
        let Some(encoded) = self.preview_image() else {
            return Ok(None);
        };
        Ok(Some(decode_preview_bytes(encoded)?))
    }

    /// Decoded unknown-face preview.
    pub fn decode_preview(&self) -> Result<Option<DynamicImage>, EventError> {
        match self.preview_jpeg()? {
            Some(bytes) => Ok(Some(image::load_from_memory(&bytes)?)),
            None => Ok(None),
        }
    }

    /// One-line human-readable description.
    pub fn summary(&self) -> String {
        match &self.payload {
            EventPayload::Recognition(Recognition::Known {
                person_id,
                person_name,
                confidence,
                ..
            }) => {
                let who = person_name.as_deref().unwrap_or(person_id);
                format!("Access granted: {who} ({:.1}%)", confidence * 100.0)
            }
            EventPayload::Recognition(Recognition::Unknown { .. }) => {
                "Unknown face detected".to_string()
            }
            EventPayload::PersonAdded { .. } => "Person added".to_string(),
            EventPayload::VisitUpdated { person_id, .. } => match person_id {
                Some(id) => format!("Visit updated: {id}"),
                None => "Visit updated".to_string(),
            },
        }
    }

    /// Re-encode in wire shape (for logging and the CLI).
    pub fn to_json(&self) -> serde_json::Value {
        let data = match &self.payload {
            EventPayload::Recognition(Recognition::Known {
                person_id,
                person_name,
                confidence,
                device_id,
            }) => serde_json::json!({
                "recognized": true,
                "person_id": person_id,
                "person_name": person_name,
                "confidence": confidence,
                "device_id": device_id,
            }),
            EventPayload::Recognition(Recognition::Unknown {
                preview_image,
                vector,
                device_id,
            }) => serde_json::json!({
                "recognized": false,
                "preview_image": preview_image,
                "vector": vector,
                "device_id": device_id,
            }),
            EventPayload::PersonAdded { status } => serde_json::json!({ "status": status }),
            EventPayload::VisitUpdated { person_id, status } => {
                serde_json::json!({ "status": status, "person_id": person_id })
            }
        };
        serde_json::json!({
            "event_type": self.kind(),
            "timestamp": self.timestamp.to_rfc3339(),
            "data": data,
        })
    }
}

fn recognition_from_wire(data: WireRecognition) -> Result<Recognition, EventError> {
    if data.recognized {
        let person_id = data
            .person_id
            .map(String::from)
            .ok_or(EventError::MissingField("person_id"))?;
        let confidence = data
            .confidence
            .ok_or(EventError::MissingField("confidence"))?;
        Ok(Recognition::Known {
            person_id,
            person_name: data.person_name,
            confidence,
            device_id: data.device_id,
        })
    } else {
        Ok(Recognition::Unknown {
            preview_image: data.preview_image,
            vector: data.vector,
            device_id: data.device_id,
        })
    }
}

fn status_from_value(value: serde_json::Value) -> Result<WireStatus, EventError> {
    if value.is_null() {
        return Ok(WireStatus::default());
    }
    Ok(serde_json::from_value(value)?)
}

fn parse_timestamp(ts: WireTimestamp) -> Result<DateTime<Utc>, EventError> {
    match ts {
        WireTimestamp::Text(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                return Ok(dt.with_timezone(&Utc));
            }
            // Python's `isoformat()` without an offset.
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
                .map_err(|_| EventError::InvalidTimestamp(s))
        }
        WireTimestamp::EpochMillis(ms) => {
            if !ms.is_finite() {
                return Err(EventError::InvalidTimestamp(ms.to_string()));
            }
            DateTime::from_timestamp_millis(ms as i64)
                .ok_or_else(|| EventError::InvalidTimestamp(ms.to_string()))
        }
    }
}

/// Decode a base64 preview, tolerating a `data:image/...;base64,` prefix.
pub fn decode_preview_bytes(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    BASE64.decode(payload.trim())
}
