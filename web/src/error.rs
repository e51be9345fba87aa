//! Error types for web handlers.
//!
//! Every failure leaves a handler as an [`AppError`] and is rendered as
//!
//! ```json
//! {"code": "VALIDATION_ERROR", "message": "content exceeds 256 characters"}
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use msgflow_core::LifecycleError;
use serde::Serialize;
use std::fmt;

/// Machine-readable error category, sent to the client as `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The request could not be parsed
    BadRequest,
    /// The request parsed but its content was rejected
    ValidationError,
    /// Storage or broker failure
    InternalServerError,
}

impl ErrorCode {
    /// Wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    /// HTTP status for the code.
    #[must_use]
    pub const fn status(self) -> StatusCode {
        match self {
            Self::BadRequest | Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application error type for web handlers.
///
/// The client sees `code` and `message`; `source` is only logged.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Vec<Message>>, AppError> {
///     let messages = state.messages.list(Page::new(0), ProcessedFilter::All).await?;
///     Ok(Json(messages))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    code: ErrorCode,
    message: String,
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create an error with a client-facing message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Malformed body or query string.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Rejected message content.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Failure on our side. Pair with [`AppError::with_source`].
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalServerError, message)
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.code.status()
    }

    /// The machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| &**e as &(dyn std::error::Error + 'static))
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: ErrorCode,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                code = self.code.as_str(),
                error = self.source.as_ref().map(tracing::field::display),
                "{}",
                self.message
            );
        } else {
            tracing::debug!(code = self.code.as_str(), "{}", self.message);
        }

        let body = ErrorBody {
            code: self.code,
            message: &self.message,
        };
        (status, Json(body)).into_response()
    }
}

/// A failed create is a 500 even when the row was stored, since the start
/// event never went out.
impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(e) => Self::validation(e.to_string()),
            LifecycleError::Storage(_) => {
                Self::internal("Message storage is unavailable").with_source(err)
            },
            LifecycleError::Publish(_) => {
                Self::internal("Message could not be dispatched for processing").with_source(err)
            },
        }
    }
}
