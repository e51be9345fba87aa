//! End-to-end message lifecycle through `MessageService`, with the store
//! and broker replaced by in-memory fakes.
//!
//! The inbound side is driven through the `CompletionSubscriber` seam, the
//! same entry point the Redpanda consumer uses.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Duration as ChronoDuration;
use msgflow_core::environment::Clock;
use msgflow_core::event_bus::CompletionSubscriber;
use msgflow_core::{CompleteProcessing, MessageId, Page, ProcessedFilter, StartProcessing};
use msgflow_runtime::MessageService;
use msgflow_testing::{InMemoryMessageStore, RecordingPublisher, test_clock};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fixtures
// ============================================================================

struct Fixture {
    service: Arc<MessageService>,
    store: InMemoryMessageStore,
    publisher: RecordingPublisher,
}

fn fixture() -> Fixture {
    msgflow_testing::init_test_tracing();

    let store = InMemoryMessageStore::with_clock(test_clock());
    let publisher = RecordingPublisher::new();
    let service = Arc::new(MessageService::new(
        Arc::new(store.clone()),
        Arc::new(publisher.clone()),
    ));

    Fixture {
        service,
        store,
        publisher,
    }
}

async fn complete(subscriber: &dyn CompletionSubscriber, event: CompleteProcessing) {
    subscriber
        .on_processing_complete(event, CancellationToken::new())
        .await;
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn message_round_trip_through_pipeline() {
    let f = fixture();
    let completed_at = test_clock().now() + ChronoDuration::seconds(5);

    let id = f.service.create("hello").await.unwrap();
    assert_eq!(id, MessageId::new(1));
    assert_eq!(f.publisher.published(), vec![StartProcessing::new(id, "hello")]);

    let pending = f
        .service
        .list(Page::new(0), ProcessedFilter::UnprocessedOnly)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    complete(
        f.service.as_ref(),
        CompleteProcessing::new(id, "hello", completed_at),
    )
    .await;

    let processed = f
        .service
        .list(Page::new(0), ProcessedFilter::ProcessedOnly)
        .await
        .unwrap();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].processed_at, Some(completed_at));
    assert!(
        f.service
            .list(Page::new(0), ProcessedFilter::UnprocessedOnly)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn repeated_completion_overwrites_timestamp() {
    let f = fixture();
    let first = test_clock().now();
    let second = first + ChronoDuration::minutes(1);

    let id = f.service.create("again").await.unwrap();
    complete(f.service.as_ref(), CompleteProcessing::new(id, "again", first)).await;
    complete(f.service.as_ref(), CompleteProcessing::new(id, "again", second)).await;

    assert_eq!(f.store.get(id).unwrap().processed_at, Some(second));
}

#[tokio::test]
async fn completion_for_unknown_id_changes_nothing() {
    let f = fixture();
    let id = f.service.create("hello").await.unwrap();

    complete(
        f.service.as_ref(),
        CompleteProcessing::new(MessageId::new(99), "", test_clock().now()),
    )
    .await;

    assert_eq!(f.store.len(), 1);
    assert_eq!(f.store.get(id).unwrap().processed_at, None);
}

#[tokio::test]
async fn completion_during_shutdown_still_applies() {
    let f = fixture();
    let id = f.service.create("late").await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    f.service
        .on_processing_complete(
            CompleteProcessing::new(id, "late", test_clock().now()),
            cancel,
        )
        .await;

    assert!(f.store.get(id).unwrap().is_processed());
}

#[tokio::test]
async fn orphan_is_listed_as_unprocessed() {
    let f = fixture();
    f.publisher.fail_publishes(true);

    assert!(f.service.create("lost").await.is_err());

    let pending = f
        .service
        .list(Page::new(0), ProcessedFilter::UnprocessedOnly)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].content, "lost");
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn pages_cover_every_message_once(count in 0usize..45) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let f = fixture();
            for i in 0..count {
                f.service.create(&format!("m{i}")).await.unwrap();
            }

            let mut seen = HashSet::new();
            let mut page = 0;
            loop {
                let batch = f
                    .service
                    .list(Page::new(page), ProcessedFilter::All)
                    .await
                    .unwrap();
                if batch.is_empty() {
                    break;
                }
                prop_assert!(batch.len() <= 10);
                for message in batch {
                    prop_assert!(seen.insert(message.id));
                }
                page += 1;
            }

            prop_assert_eq!(seen.len(), count);
            Ok(())
        })?;
    }
}
