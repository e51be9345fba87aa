//! Recording fakes for the broker seams.

use msgflow_core::event_bus::{CompletionSubscriber, EventBusError, StartProcessingPublisher};
use msgflow_core::{CompleteProcessing, StartProcessing};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Topic name reported in injected publish failures.
const FAKE_TOPIC: &str = "processing-messages";

/// Captures every start event instead of sending it to a broker.
///
/// Clones share the captured list.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<StartProcessing>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingPublisher {
    /// Create a publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent publish with [`EventBusError::PublishFailed`].
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Events accepted so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<StartProcessing> {
        self.published.lock().unwrap().clone()
    }
}

impl StartProcessingPublisher for RecordingPublisher {
    fn publish_start_processing(
        &self,
        event: &StartProcessing,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let event = event.clone();
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic: FAKE_TOPIC.to_string(),
                    reason: "injected publish failure".to_string(),
                });
            }
            self.published.lock().unwrap().push(event);
            Ok(())
        })
    }
}

/// Captures completion events delivered by a consumer.
///
/// Tests against a real broker use [`RecordingSubscriber::wait_for`] to
/// block until the expected number of events has arrived.
#[derive(Clone, Default)]
pub struct RecordingSubscriber {
    received: Arc<Mutex<Vec<CompleteProcessing>>>,
    cancelled_during_dispatch: Arc<AtomicBool>,
    notify: Arc<Notify>,
    started: Arc<Notify>,
    delay: Duration,
}

impl RecordingSubscriber {
    /// Create an empty subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a subscriber that takes `delay` to handle each event, so a
    /// test can stop the consumer while a dispatch is in flight.
    #[must_use]
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Wait until a dispatch has begun. Returns immediately if one began
    /// since the last call.
    pub async fn dispatch_started(&self) {
        self.started.notified().await;
    }

    /// Events received so far, in delivery order.
    #[must_use]
    pub fn received(&self) -> Vec<CompleteProcessing> {
        self.received.lock().unwrap().clone()
    }

    /// Whether any dispatch finished with its cancellation token fired.
    #[must_use]
    pub fn saw_cancellation(&self) -> bool {
        self.cancelled_during_dispatch.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` events have arrived.
    ///
    /// Returns the events received so far, or `None` on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Option<Vec<CompleteProcessing>> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                let events = self.received();
                if events.len() >= count {
                    return events;
                }
                notified.await;
            }
        })
        .await
        .ok()
    }
}

impl CompletionSubscriber for RecordingSubscriber {
    fn on_processing_complete(
        &self,
        event: CompleteProcessing,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.started.notify_one();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if cancel.is_cancelled() {
                self.cancelled_during_dispatch.store(true, Ordering::SeqCst);
            }
            self.received.lock().unwrap().push(event);
            self.notify.notify_waiters();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_clock;
    use msgflow_core::MessageId;
    use msgflow_core::environment::Clock;

    #[tokio::test]
    async fn publisher_records_in_order() {
        let publisher = RecordingPublisher::new();
        publisher
            .publish_start_processing(&StartProcessing::new(MessageId::new(1), "a"))
            .await
            .unwrap();
        publisher
            .publish_start_processing(&StartProcessing::new(MessageId::new(2), "b"))
            .await
            .unwrap();

        let ids: Vec<u64> = publisher.published().iter().map(|e| e.id.value()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn publisher_failure_records_nothing() {
        let publisher = RecordingPublisher::new();
        publisher.fail_publishes(true);

        let err = publisher
            .publish_start_processing(&StartProcessing::new(MessageId::new(1), "a"))
            .await
            .unwrap_err();

        assert!(matches!(err, EventBusError::PublishFailed { .. }));
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn subscriber_wait_for_wakes_on_delivery() {
        let subscriber = RecordingSubscriber::new();
        let delivering = subscriber.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            delivering
                .on_processing_complete(
                    CompleteProcessing::new(MessageId::new(3), "c", test_clock().now()),
                    CancellationToken::new(),
                )
                .await;
        });

        let events = subscriber.wait_for(1, Duration::from_secs(5)).await.unwrap();
        assert_eq!(events[0].id, MessageId::new(3));
        assert!(!subscriber.saw_cancellation());
    }

    #[tokio::test]
    async fn delayed_subscriber_observes_cancellation_mid_dispatch() {
        let subscriber = RecordingSubscriber::with_delay(Duration::from_millis(50));
        let cancel = CancellationToken::new();

        let dispatch = tokio::spawn({
            let subscriber = subscriber.clone();
            let cancel = cancel.clone();
            async move {
                subscriber
                    .on_processing_complete(
                        CompleteProcessing::new(MessageId::new(4), "d", test_clock().now()),
                        cancel,
                    )
                    .await;
            }
        });

        subscriber.dispatch_started().await;
        cancel.cancel();
        dispatch.await.unwrap();

        assert_eq!(subscriber.received().len(), 1);
        assert!(subscriber.saw_cancellation());
    }

    #[tokio::test]
    async fn subscriber_wait_for_times_out() {
        let subscriber = RecordingSubscriber::new();
        assert!(subscriber.wait_for(1, Duration::from_millis(10)).await.is_none());
    }
}
