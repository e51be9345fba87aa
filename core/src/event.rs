//! Domain events exchanged with the external processing pipeline.
//!
//! Both events travel as self-describing JSON objects so that producers and
//! consumers written in other languages can read them:
//!
//! ```text
//! outbound  {"id": 1, "content": "hello"}
//! inbound   {"id": 1, "content": "hello", "ProcessedAt": "..."}
//! ```
//!
//! The inbound `ProcessedAt` field is ignored. [`CompleteProcessing::decode`]
//! stamps the receipt time instead, so `processed_at` means "when this
//! service observed completion", not "when the pipeline finished".

use crate::message::MessageId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for event encoding and decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize an event.
    #[error("Failed to serialize event: {0}")]
    Encode(String),

    /// Inbound payload was missing or malformed.
    #[error("Failed to decode event: {0}")]
    Decode(String),
}

/// Emitted once per successful creation, asking the pipeline to process a
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartProcessing {
    /// Message identifier
    pub id: MessageId,
    /// Message text
    pub content: String,
}

impl StartProcessing {
    /// Create a start event.
    #[must_use]
    pub fn new(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
        }
    }

    /// Encode as the outbound JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::Encode(e.to_string()))
    }
}

/// Reported by the pipeline when a message has been processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompleteProcessing {
    /// Message identifier
    pub id: MessageId,
    /// Message text as echoed by the pipeline
    pub content: String,
    /// Receipt time at this service
    #[serde(rename = "ProcessedAt")]
    pub processed_at: DateTime<Utc>,
}

/// Wire shape of an inbound completion. Unknown fields (including the
/// pipeline's own `ProcessedAt`) are dropped.
#[derive(Deserialize)]
struct InboundCompletion {
    id: MessageId,
    #[serde(default)]
    content: String,
}

impl CompleteProcessing {
    /// Create a completion event.
    #[must_use]
    pub fn new(id: MessageId, content: impl Into<String>, processed_at: DateTime<Utc>) -> Self {
        Self {
            id,
            content: content.into(),
            processed_at,
        }
    }

    /// Decode an inbound payload, stamping `received_at` as `processed_at`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Decode`] if the payload is not a JSON object
    /// with a numeric `id`.
    pub fn decode(payload: &[u8], received_at: DateTime<Utc>) -> Result<Self, EventError> {
        let inbound: InboundCompletion =
            serde_json::from_slice(payload).map_err(|e| EventError::Decode(e.to_string()))?;

        Ok(Self {
            id: inbound.id,
            content: inbound.content,
            processed_at: received_at,
        })
    }
}
