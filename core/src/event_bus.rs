//! Broker-facing seams of the message lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  publish_start_processing   ┌──────────────┐
//! │ MessageService  │ ──────────────────────────► │   Producer   │──► outbound topic
//! │                 │                             └──────────────┘
//! │                 │  on_processing_complete     ┌──────────────┐
//! │                 │ ◄────────────────────────── │   Consumer   │◄── inbound topic
//! └─────────────────┘                             └──────────────┘
//! ```
//!
//! - **Publish is awaited**: the caller does not proceed until the broker
//!   acknowledges or the send fails. No retry.
//! - **Completion is fire-and-forget**: the subscriber callback cannot fail;
//!   errors on that path end in a log line.
//!
//! # Dyn Compatibility
//!
//! Both traits return `Pin<Box<dyn Future>>` instead of using `async fn` so
//! they can be held as `Arc<dyn ...>` and swapped for in-memory fakes.

use crate::event::{CompleteProcessing, StartProcessing};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during broker operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the broker or build a client
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Consumer group membership failed or the group hit a fatal error
    #[error("Consumer group error: {0}")]
    ConsumerGroupError(String),

    /// Failed to flush or release a connection
    #[error("Close failed: {0}")]
    CloseFailed(String),
}

/// Publishes [`StartProcessing`] events to the outbound topic.
///
/// Implementations must be `Send + Sync`: concurrent `create` calls share
/// one publisher.
pub trait StartProcessingPublisher: Send + Sync {
    /// Publish a start event and wait for the broker's acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the event cannot be
    /// encoded, or the broker rejects it, or the send times out.
    fn publish_start_processing(
        &self,
        event: &StartProcessing,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;
}

/// Receives decoded [`CompleteProcessing`] events from the consumer.
///
/// There is no caller to report failure to, so the callback is infallible.
/// `cancel` is scoped to this one dispatch: it fires when the consumer is
/// asked to shut down, but the consumer still waits for the returned future.
pub trait CompletionSubscriber: Send + Sync {
    /// Handle one completion event.
    fn on_processing_complete(
        &self,
        event: CompleteProcessing,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_failed_display() {
        let err = EventBusError::PublishFailed {
            topic: "processing-messages".to_string(),
            reason: "broker down".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Publish failed for topic 'processing-messages': broker down"
        );
    }

    #[test]
    fn traits_are_dyn_compatible() {
        fn assert_dyn(_: Option<&dyn StartProcessingPublisher>, _: Option<&dyn CompletionSubscriber>) {}
        assert_dyn(None, None);
    }
}
