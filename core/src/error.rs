//! Error types surfaced by request-driven lifecycle operations.
//!
//! Broker-driven paths (completion updates, inbound decoding) never return
//! these to a caller; they end in a log line.

use crate::event_bus::EventBusError;
use crate::store::StoreError;
use thiserror::Error;

/// Input rejected before any state change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Content was empty
    #[error("content must not be empty")]
    EmptyContent,

    /// Content exceeded the character limit
    #[error("content is {len} characters long, at most {max} allowed")]
    ContentTooLong {
        /// Actual length in characters
        len: usize,
        /// Allowed maximum
        max: usize,
    },
}

/// Failure of a request-driven lifecycle operation (`create`, `list`).
#[derive(Error, Debug, Clone)]
pub enum LifecycleError {
    /// Malformed input; nothing was stored or published.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Reading or writing the store failed.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// The start event could not be published.
    ///
    /// For `create` this means the message row already exists but no start
    /// event was sent for it.
    #[error(transparent)]
    Publish(#[from] EventBusError),
}
