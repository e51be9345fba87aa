//! Axum HTTP transport for msgflow.
//!
//! A thin shell over [`MessageService`](msgflow_runtime::MessageService):
//! handlers parse the request, call the orchestrator, and map the result
//! to a response. No business rules live here.
//!
//! # Routes
//!
//! | Method | Path           | Handler                                   |
//! |--------|----------------|-------------------------------------------|
//! | POST   | `/v1/messages` | [`handlers::messages::create_message`]    |
//! | GET    | `/v1/messages` | [`handlers::messages::list_messages`]     |
//! | GET    | `/health`      | [`handlers::health::health_check`]        |
//!
//! # Example
//!
//! ```ignore
//! use msgflow_web::{router, AppState};
//!
//! let app = router(AppState::new(Arc::new(service)));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod state;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

// Re-export key types for convenience
pub use error::{AppError, ErrorCode};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the application router with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/messages",
            get(handlers::messages::list_messages).post(handlers::messages::create_message),
        )
        .route("/health", get(handlers::health::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
