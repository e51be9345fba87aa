//! # msgflow Runtime
//!
//! The message lifecycle orchestrator.
//!
//! [`MessageService`] is the only component with business rules. It owns no
//! durable state: every side effect goes through one of two injected
//! collaborators.
//!
//! ```text
//!            create(content)                       on_processing_complete(event)
//!                  │                                          │
//!                  ▼                                          ▼
//!        ┌───────────────────┐                      ┌───────────────────┐
//!        │ 1. validate       │                      │ update_by_id      │
//!        │ 2. store.insert   │── id ──┐             │ (processed_at)    │
//!        │ 3. publish start  │◄───────┘             │ errors: log only  │
//!        └───────────────────┘                      └───────────────────┘
//! ```
//!
//! ## Failure semantics
//!
//! - Validation fails: nothing is stored, nothing is published.
//! - Insert fails: nothing is published.
//! - Publish fails: the row stays in the store, unprocessed, and no start
//!   event was ever sent for it (an orphan record). The error still reaches
//!   the caller.
//! - Completion update fails: logged and dropped. The pipeline does not
//!   resend, so the completion is lost.
//!
//! ## Example
//!
//! ```ignore
//! use msgflow_runtime::MessageService;
//! use msgflow_core::{Page, ProcessedFilter};
//!
//! let service = MessageService::new(store, producer);
//!
//! let id = service.create("hello").await?;
//! let unprocessed = service.list(Page::new(0), ProcessedFilter::UnprocessedOnly).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod metrics;

use msgflow_core::event_bus::{CompletionSubscriber, StartProcessingPublisher};
use msgflow_core::store::MessageStore;
use msgflow_core::{
    CompleteProcessing, Content, LifecycleError, Message, MessageId, MessageUpdate, NewMessage,
    Page, ProcessedFilter, StartProcessing,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Coordinates the store and the start-event publisher, and records
/// completions reported by the consumer.
///
/// Cheap to share: wrap in an `Arc` and hand it to both the HTTP layer and
/// the event consumer.
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn MessageStore>,
    publisher: Arc<dyn StartProcessingPublisher>,
}

impl MessageService {
    /// Create a service over the given collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, publisher: Arc<dyn StartProcessingPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Store a new message and dispatch it for processing.
    ///
    /// Returns the id assigned by the store once the start event has been
    /// acknowledged by the broker.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::Validation`] if `content` is empty or too long.
    ///   No I/O happens.
    /// - [`LifecycleError::Storage`] if the insert fails. Nothing is published.
    /// - [`LifecycleError::Publish`] if the start event is rejected. The message
    ///   row has already been written and is not rolled back.
    pub async fn create(&self, content: &str) -> Result<MessageId, LifecycleError> {
        let content = Content::parse(content).inspect_err(|e| {
            debug!(error = %e, "Rejected message content");
        })?;

        info!(message_size = content.as_str().len(), "Creating message");

        let id = self
            .store
            .insert(NewMessage::new(content.clone()))
            .await
            .inspect_err(|e| {
                error!(error = %e, "Failed to store message");
            })?;

        let event = StartProcessing::new(id, content.into_inner());

        if let Err(e) = self.publisher.publish_start_processing(&event).await {
            ::metrics::counter!(metrics::MESSAGES_PUBLISH_FAILED).increment(1);
            warn!(
                message_id = %id,
                error = %e,
                "Message stored but start event was not published"
            );
            return Err(e.into());
        }

        ::metrics::counter!(metrics::MESSAGES_CREATED).increment(1);
        info!(message_id = %id, "Message sent for processing");

        Ok(id)
    }

    /// List one page of messages matching `filter`, ordered by id.
    ///
    /// Pages hold up to [`msgflow_core::message::PAGE_SIZE`] messages. A page
    /// beyond the data is empty, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Storage`] if the query fails.
    pub async fn list(
        &self,
        page: Page,
        filter: ProcessedFilter,
    ) -> Result<Vec<Message>, LifecycleError> {
        let (limit, offset) = (page.limit(), page.offset());

        let result = match filter {
            ProcessedFilter::All => self.store.list_all(limit, offset).await,
            ProcessedFilter::ProcessedOnly => self.store.list_processed(limit, offset).await,
            ProcessedFilter::UnprocessedOnly => self.store.list_unprocessed(limit, offset).await,
        };

        match result {
            Ok(messages) => {
                debug!(
                    page = page.number(),
                    filter = ?filter,
                    count = messages.len(),
                    "Listed messages"
                );
                Ok(messages)
            },
            Err(e) => {
                error!(page = page.number(), filter = ?filter, error = %e, "Failed to list messages");
                Err(e.into())
            },
        }
    }

    /// Record that the pipeline finished processing a message.
    ///
    /// Applies `processed_at` from the event. A message that is already
    /// processed is overwritten with the newer timestamp; there is no guard.
    /// Failures are logged and dropped because no caller is waiting.
    pub async fn record_completion(&self, event: CompleteProcessing) {
        let id = event.id;
        let update = MessageUpdate::processed(id, event.processed_at);

        match self.store.update_by_id(update).await {
            Ok(message) => {
                ::metrics::counter!(metrics::MESSAGES_PROCESSED).increment(1);
                info!(
                    message_id = %id,
                    processed_at = %event.processed_at,
                    created_at = %message.created_at,
                    "Recorded message completion"
                );
            },
            Err(e) => {
                ::metrics::counter!(metrics::MESSAGES_UPDATE_FAILED).increment(1);
                error!(
                    message_id = %id,
                    error = %e,
                    "Failed to record message completion; completion is lost"
                );
            },
        }
    }
}

impl CompletionSubscriber for MessageService {
    fn on_processing_complete(
        &self,
        event: CompleteProcessing,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            // The update still runs to completion during shutdown.
            if cancel.is_cancelled() {
                debug!(message_id = %event.id, "Recording completion while shutting down");
            }
            self.record_completion(event).await;
        })
    }
}
