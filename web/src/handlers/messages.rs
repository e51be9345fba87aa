//! Message endpoints.
//!
//! ```text
//! POST /v1/messages            {"content": "..."}  →  {"id": 1}
//! GET  /v1/messages?page=0&processed=true          →  [Message, ...]
//! ```

use crate::WebResult;
use crate::extractors::{JsonBody, QueryParams};
use crate::state::AppState;
use axum::{extract::State, Json};
use msgflow_core::{Message, MessageId, Page, ProcessedFilter};
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/messages`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageRequest {
    /// Message text, 1 to 256 characters
    pub content: String,
}

/// Response of `POST /v1/messages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMessageResponse {
    /// Id assigned by the store
    pub id: MessageId,
}

/// Query of `GET /v1/messages`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ListMessagesQuery {
    /// Zero-based page number
    #[serde(default)]
    pub page: u64,
    /// `true` for processed only, `false` for unprocessed only, absent for all
    pub processed: Option<bool>,
}

/// Store a message and send it for processing.
///
/// # Errors
///
/// - 400 if the body is not `{"content": string}` or the content is empty
///   or longer than 256 characters.
/// - 500 if the message could not be stored or dispatched.
pub async fn create_message(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateMessageRequest>,
) -> WebResult<Json<CreateMessageResponse>> {
    let id = state.messages.create(&request.content).await?;
    Ok(Json(CreateMessageResponse { id }))
}

/// List one page of messages, optionally filtered by processing status.
///
/// # Errors
///
/// - 400 if `page` or `processed` cannot be parsed.
/// - 500 if the store query fails.
pub async fn list_messages(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ListMessagesQuery>,
) -> WebResult<Json<Vec<Message>>> {
    let messages = state
        .messages
        .list(Page::new(query.page), ProcessedFilter::from(query.processed))
        .await?;
    Ok(Json(messages))
}
