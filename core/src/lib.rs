//! # msgflow Core
//!
//! Core types and collaborator traits for the msgflow message lifecycle.
//!
//! A message moves through three observable points in its life:
//!
//! ```text
//! ┌──────────────┐   StartProcessing    ┌──────────────────┐
//! │   created    │ ───────────────────► │ external pipeline│
//! │ (persisted)  │    outbound topic    └────────┬─────────┘
//! └──────────────┘                               │
//!        ▲                                       │ CompleteProcessing
//!        │  processed_at = receipt time          │ inbound topic
//!        └───────────────────────────────────────┘
//! ```
//!
//! The only persisted state is `processed_at`: absent means unprocessed,
//! present means processed.
//!
//! This crate holds no I/O. Storage, broker and transport live in the
//! `msgflow-postgres`, `msgflow-redpanda` and `msgflow-web` crates, and
//! plug into the orchestrator through the traits in [`store`] and
//! [`event_bus`].

pub mod error;
pub mod event;
pub mod event_bus;
pub mod message;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{LifecycleError, ValidationError};
pub use event::{CompleteProcessing, EventError, StartProcessing};
pub use event_bus::{CompletionSubscriber, EventBusError, StartProcessingPublisher};
pub use message::{Content, Message, MessageId, MessageUpdate, NewMessage, Page, ProcessedFilter};
pub use store::{MessageStore, StoreError};

/// Environment module - Dependency injection traits
///
/// External dependencies that are not collaborators in their own right
/// (currently only time) are abstracted here so tests can pin them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// The event consumer stamps `processed_at` from a [`Clock`], so a
    /// fixed clock makes completion timestamps deterministic in tests.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
