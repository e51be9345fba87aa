//! # msgflow Testing
//!
//! Testing utilities for the msgflow message lifecycle.
//!
//! This crate provides:
//! - [`InMemoryMessageStore`]: a `MessageStore` backed by a `BTreeMap`
//! - [`RecordingPublisher`]: captures published start events, can be told to fail
//! - [`RecordingSubscriber`]: captures completion events delivered by a consumer
//! - [`FixedClock`] / [`test_clock`]: deterministic time
//!
//! ## Example
//!
//! ```ignore
//! use msgflow_testing::{InMemoryMessageStore, RecordingPublisher, test_clock};
//! use msgflow_runtime::MessageService;
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_create() {
//!     let store = InMemoryMessageStore::with_clock(test_clock());
//!     let publisher = RecordingPublisher::new();
//!     let service = MessageService::new(Arc::new(store.clone()), Arc::new(publisher.clone()));
//!
//!     let id = service.create("hello").await.unwrap();
//!     assert_eq!(publisher.published().len(), 1);
//! }
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

mod broker;
mod store;

pub use broker::{RecordingPublisher, RecordingSubscriber};
pub use store::InMemoryMessageStore;

use chrono::{DateTime, Utc};
use msgflow_core::environment::Clock;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use msgflow_testing::mocks::FixedClock;
    /// use msgflow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

pub use mocks::{FixedClock, test_clock};

/// Install a test-friendly tracing subscriber.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "msgflow=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
