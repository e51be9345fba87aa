//! Storage collaborator contract.
//!
//! The orchestrator reads and writes messages only through [`MessageStore`].
//! Implementations share an underlying connection pool across concurrent
//! calls and must be safe to use from many tasks at once.

use crate::message::{Message, MessageId, MessageUpdate, NewMessage};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Database query or connection failed
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// No message with this id exists
    #[error("Message {0} not found")]
    NotFound(MessageId),
}

/// Boxed future returned by [`MessageStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistence for [`Message`] rows.
///
/// List methods return at most `limit` rows after skipping `offset`, ordered
/// by id ascending.
pub trait MessageStore: Send + Sync {
    /// Page through all messages.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    fn list_all(&self, limit: u64, offset: u64) -> StoreFuture<'_, Vec<Message>>;

    /// Page through messages whose `processed_at` is set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    fn list_processed(&self, limit: u64, offset: u64) -> StoreFuture<'_, Vec<Message>>;

    /// Page through messages whose `processed_at` is absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    fn list_unprocessed(&self, limit: u64, offset: u64) -> StoreFuture<'_, Vec<Message>>;

    /// Insert a new message and return its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the insert fails.
    fn insert(&self, message: NewMessage) -> StoreFuture<'_, MessageId>;

    /// Apply the `Some` fields of `update` to the message it names and
    /// return the full row afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no such message exists and
    /// [`StoreError::DatabaseError`] if the update fails.
    fn update_by_id(&self, update: MessageUpdate) -> StoreFuture<'_, Message>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        assert_eq!(
            StoreError::NotFound(MessageId::new(9)).to_string(),
            "Message 9 not found"
        );
    }
}
