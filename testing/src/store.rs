//! In-memory storage collaborator.

use msgflow_core::environment::{Clock, SystemClock};
use msgflow_core::store::{MessageStore, StoreError, StoreFuture};
use msgflow_core::{Message, MessageId, MessageUpdate, NewMessage, ProcessedFilter};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory message store for fast, deterministic testing.
///
/// Ids start at 1 and increase by one per insert, like a `BIGSERIAL`
/// column. Clones share the same data, so a test can keep one handle for
/// assertions and give another to the code under test.
///
/// # Example
///
/// ```
/// use msgflow_testing::{InMemoryMessageStore, test_clock};
/// use msgflow_core::{Content, NewMessage, MessageStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryMessageStore::with_clock(test_clock());
/// let id = store.insert(NewMessage::new(Content::parse("hi")?)).await?;
/// assert_eq!(id.value(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryMessageStore {
    rows: Arc<RwLock<BTreeMap<MessageId, Message>>>,
    clock: Arc<dyn Clock>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    insert_calls: Arc<AtomicUsize>,
}

impl InMemoryMessageStore {
    /// Create an empty store that stamps `created_at` from the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an empty store that stamps `created_at` from `clock`.
    #[must_use]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            clock: Arc::new(clock),
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
            insert_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every list call fail with a database error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every insert and update fail with a database error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of insert attempts, including failed ones.
    #[must_use]
    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().unwrap().is_empty()
    }

    /// Fetch one message by id.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<Message> {
        self.rows.read().unwrap().get(&id).cloned()
    }

    /// All messages, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.rows.read().unwrap().values().cloned().collect()
    }

    fn page(&self, filter: ProcessedFilter, limit: u64, offset: u64) -> Result<Vec<Message>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::DatabaseError("injected read failure".to_string()));
        }

        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        let take = usize::try_from(limit).unwrap_or(usize::MAX);

        Ok(self
            .rows
            .read()
            .unwrap()
            .values()
            .filter(|m| filter.matches(m))
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::DatabaseError("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn list_all(&self, limit: u64, offset: u64) -> StoreFuture<'_, Vec<Message>> {
        let result = self.page(ProcessedFilter::All, limit, offset);
        Box::pin(async move { result })
    }

    fn list_processed(&self, limit: u64, offset: u64) -> StoreFuture<'_, Vec<Message>> {
        let result = self.page(ProcessedFilter::ProcessedOnly, limit, offset);
        Box::pin(async move { result })
    }

    fn list_unprocessed(&self, limit: u64, offset: u64) -> StoreFuture<'_, Vec<Message>> {
        let result = self.page(ProcessedFilter::UnprocessedOnly, limit, offset);
        Box::pin(async move { result })
    }

    fn insert(&self, message: NewMessage) -> StoreFuture<'_, MessageId> {
        Box::pin(async move {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            self.check_writable()?;

            let mut rows = self.rows.write().unwrap();
            let next = rows.keys().next_back().map_or(1, |last| last.value() + 1);
            let id = MessageId::new(next);
            rows.insert(
                id,
                Message {
                    id,
                    content: message.content.into_inner(),
                    created_at: self.clock.now(),
                    processed_at: None,
                },
            );
            Ok(id)
        })
    }

    fn update_by_id(&self, update: MessageUpdate) -> StoreFuture<'_, Message> {
        Box::pin(async move {
            self.check_writable()?;

            let mut rows = self.rows.write().unwrap();
            let row = rows
                .get_mut(&update.id)
                .ok_or(StoreError::NotFound(update.id))?;
            if let Some(processed_at) = update.processed_at {
                row.processed_at = Some(processed_at);
            }
            Ok(row.clone())
        })
    }
}
