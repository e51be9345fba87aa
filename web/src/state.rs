//! Application state for Axum handlers.

use msgflow_runtime::MessageService;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Holds the orchestrator; the handlers never touch the store or the broker
/// directly.
#[derive(Clone)]
pub struct AppState {
    /// Message lifecycle orchestrator
    pub messages: Arc<MessageService>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(messages: Arc<MessageService>) -> Self {
        Self { messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Axum requires state to be Clone
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
