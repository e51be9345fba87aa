//! The persisted unit of work and the values used to create, update and
//! page through it.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of message content, in Unicode scalar values.
pub const MAX_CONTENT_LEN: usize = 256;

/// Number of messages returned per page by list operations.
pub const PAGE_SIZE: u64 = 10;

/// Store-assigned message identifier.
///
/// Monotonic and never reused. Serialized as a bare JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated message content.
///
/// Non-empty and at most [`MAX_CONTENT_LEN`] characters. Length is counted
/// in `char`s, not bytes, so multi-byte text gets the same budget as ASCII.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Content(String);

impl Content {
    /// Validate raw user input.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyContent`] for an empty string and
    /// [`ValidationError::ContentTooLong`] when the input exceeds
    /// [`MAX_CONTENT_LEN`] characters.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        let len = raw.chars().count();
        if len > MAX_CONTENT_LEN {
            return Err(ValidationError::ContentTooLong {
                len,
                max: MAX_CONTENT_LEN,
            });
        }
        Ok(Self(raw))
    }

    /// Borrow the text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take ownership of the text.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for Content {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted message.
///
/// `processed_at` is the entire state model: `None` means the message has
/// not been reported as processed (whether or not its start event was ever
/// published), `Some` means completion was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier
    pub id: MessageId,
    /// Immutable text
    pub content: String,
    /// Insertion time, immutable
    pub created_at: DateTime<Utc>,
    /// When completion was observed, if it has been
    pub processed_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Whether completion has been recorded for this message.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// A message that has not been stored yet.
///
/// The store assigns `id` and `created_at` on insertion; `processed_at`
/// always starts absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Validated text
    pub content: Content,
}

impl NewMessage {
    /// Create an unprocessed message with the given content.
    #[must_use]
    pub const fn new(content: Content) -> Self {
        Self { content }
    }
}

/// Partial update keyed by id. Only `Some` fields are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageUpdate {
    /// Message to update
    pub id: MessageId,
    /// New processed timestamp, if any
    pub processed_at: Option<DateTime<Utc>>,
}

impl MessageUpdate {
    /// Update that marks `id` as processed at `at`.
    #[must_use]
    pub const fn processed(id: MessageId, at: DateTime<Utc>) -> Self {
        Self {
            id,
            processed_at: Some(at),
        }
    }
}

/// Which messages a list operation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessedFilter {
    /// Every message
    #[default]
    All,
    /// Only messages with `processed_at` set
    ProcessedOnly,
    /// Only messages with `processed_at` absent
    UnprocessedOnly,
}

impl From<Option<bool>> for ProcessedFilter {
    fn from(processed: Option<bool>) -> Self {
        match processed {
            None => Self::All,
            Some(true) => Self::ProcessedOnly,
            Some(false) => Self::UnprocessedOnly,
        }
    }
}

impl ProcessedFilter {
    /// Whether `message` passes this filter.
    #[must_use]
    pub const fn matches(self, message: &Message) -> bool {
        match self {
            Self::All => true,
            Self::ProcessedOnly => message.is_processed(),
            Self::UnprocessedOnly => !message.is_processed(),
        }
    }
}

/// Zero-based page number.
///
/// There is no upper bound: a page past the end of the data is simply empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Page(u64);

impl Page {
    /// Page `n` (zero-based).
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// Page number.
    #[must_use]
    pub const fn number(self) -> u64 {
        self.0
    }

    /// Rows per page.
    #[must_use]
    pub const fn limit(self) -> u64 {
        PAGE_SIZE
    }

    /// Rows to skip, saturating at `u64::MAX`.
    #[must_use]
    pub const fn offset(self) -> u64 {
        self.0.saturating_mul(PAGE_SIZE)
    }
}

impl From<u64> for Page {
    fn from(n: u64) -> Self {
        Self(n)
    }
}
