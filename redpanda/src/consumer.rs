//! Inbound `CompleteProcessing` consumer.
//!
//! # Lifecycle
//!
//! ```text
//! Initializing ──first assignment──► Ready ──first record──► Consuming
//!                                      │                        │
//!                                      └────────stop()──────────┤
//!                                                               ▼
//!                                                           Draining ──► Closed
//! ```
//!
//! [`CompletionConsumer::start`] returns only once the group has assigned
//! partitions at least once, so the caller knows completions are flowing.
//! [`RunningConsumer::stop`] waits for the background task to exit, and the
//! task releases the connection on its way out.

use msgflow_core::CompleteProcessing;
use msgflow_core::environment::{Clock, SystemClock};
use msgflow_core::event_bus::{CompletionSubscriber, EventBusError};
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

const DEFAULT_AUTO_OFFSET_RESET: &str = "latest";
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(6);

/// Where a consumer is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Group membership is being negotiated.
    Initializing,
    /// Partitions have been assigned at least once.
    Ready,
    /// At least one record has been received.
    Consuming,
    /// Stop was requested; the loop is exiting.
    Draining,
    /// The loop has exited and the connection is released.
    Closed,
}

/// rdkafka callbacks for the consumer's connection.
///
/// Librdkafka invokes these from inside `recv()`, on the consume task.
struct CompletionContext {
    /// Readiness latch. Taken on the first assignment, so it fires once.
    ready: Mutex<Option<oneshot::Sender<()>>>,
    state: watch::Sender<ConsumerState>,
    fatal: CancellationToken,
    fatal_reason: Mutex<Option<String>>,
}

impl CompletionContext {
    fn new(ready: oneshot::Sender<()>, state: watch::Sender<ConsumerState>) -> Self {
        Self {
            ready: Mutex::new(Some(ready)),
            state,
            fatal: CancellationToken::new(),
            fatal_reason: Mutex::new(None),
        }
    }

    fn mark_ready(&self) {
        let sender = self.ready.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sender) = sender {
            self.state.send_replace(ConsumerState::Ready);
            let _ = sender.send(());
            tracing::info!("Consumer group session established");
        }
    }

    fn mark_consuming(&self) {
        self.state.send_if_modified(|state| {
            if *state == ConsumerState::Ready {
                *state = ConsumerState::Consuming;
                true
            } else {
                false
            }
        });
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }

    /// Record the first fatal error and wake the consume loop.
    fn record_fatal(&self, reason: String) {
        if let Ok(mut slot) = self.fatal_reason.lock() {
            slot.get_or_insert(reason);
        }
        self.fatal.cancel();
    }

    /// Move to `Draining`, cancel the process-wide `shutdown` token, and
    /// produce the error the consume task exits with.
    fn escalate(&self, shutdown: &CancellationToken, topic: &str, reason: String) -> EventBusError {
        tracing::error!(
            topic,
            reason = %reason,
            "Consumer hit an unrecoverable broker error; shutting down"
        );
        self.set_state(ConsumerState::Draining);
        shutdown.cancel();
        EventBusError::ConsumerGroupError(reason)
    }

    fn fatal_reason(&self) -> String {
        self.fatal_reason
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| "fatal broker error".to_string())
    }
}

impl ClientContext for CompletionContext {
    fn error(&self, error: KafkaError, reason: &str) {
        if is_fatal(&error) {
            tracing::error!(error = %error, reason = reason, "Fatal consumer error");
            self.record_fatal(format!("{error}: {reason}"));
        } else {
            tracing::warn!(error = %error, reason = reason, "Consumer error");
        }
    }
}

impl ConsumerContext for CompletionContext {
    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(partitions) => {
                tracing::info!(partitions = partitions.count(), "Partitions assigned");
                self.mark_ready();
            },
            Rebalance::Revoke(partitions) => {
                tracing::info!(partitions = partitions.count(), "Partitions revoked");
            },
            Rebalance::Error(e) => {
                tracing::warn!(error = %e, "Rebalance failed; librdkafka will rejoin the group");
            },
        }
    }
}

fn is_fatal(error: &KafkaError) -> bool {
    error.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal)
}

/// Consumes [`CompleteProcessing`] events from the inbound topic.
///
/// Holds configuration only; each [`start`](Self::start) opens a fresh
/// connection. All instances sharing a group id split the topic's
/// partitions between them.
///
/// # Example
///
/// ```no_run
/// use msgflow_redpanda::CompletionConsumer;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let consumer = CompletionConsumer::builder()
///     .brokers("localhost:9092")
///     .group_id("message-service")
///     .topic("processed-messages")
///     .auto_offset_reset("earliest")
///     .ready_timeout(Duration::from_secs(30))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct CompletionConsumer {
    brokers: String,
    group_id: String,
    topic: String,
    auto_offset_reset: String,
    session_timeout: Duration,
    ready_timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl CompletionConsumer {
    /// Create a new builder for configuring the consumer.
    #[must_use]
    pub fn builder() -> CompletionConsumerBuilder {
        CompletionConsumerBuilder::default()
    }

    /// The inbound topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The consumer group id.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Join the group and start dispatching completions to `subscriber`.
    ///
    /// Blocks until the first partition assignment. `shutdown` is the
    /// process-wide token: the consumer cancels it if it hits an
    /// unrecoverable broker error, and gives up waiting for readiness if it
    /// is cancelled first. Stopping the loop itself is done through
    /// [`RunningConsumer::stop`].
    ///
    /// # Errors
    ///
    /// - [`EventBusError::SubscriptionFailed`] if the client cannot be
    ///   created or subscribed.
    /// - [`EventBusError::ConsumerGroupError`] if the background task exits,
    ///   the readiness timeout elapses, or `shutdown` fires before the first
    ///   assignment.
    pub async fn start(
        &self,
        subscriber: Arc<dyn CompletionSubscriber>,
        shutdown: CancellationToken,
    ) -> Result<RunningConsumer, EventBusError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(ConsumerState::Initializing);

        let consumer: StreamConsumer<CompletionContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", self.session_timeout.as_millis().to_string())
            .set("enable.partition.eof", "false")
            .create_with_context(CompletionContext::new(ready_tx, state_tx))
            .map_err(|e| EventBusError::SubscriptionFailed {
                topics: vec![self.topic.clone()],
                reason: format!("Failed to create consumer: {e}"),
            })?;

        consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(|e| EventBusError::SubscriptionFailed {
                topics: vec![self.topic.clone()],
                reason: format!("Failed to subscribe: {e}"),
            })?;

        tracing::info!(
            topic = %self.topic,
            consumer_group = %self.group_id,
            auto_offset_reset = %self.auto_offset_reset,
            "Subscribed; waiting for partition assignment"
        );

        let stop = CancellationToken::new();
        let task = ConsumeLoop {
            consumer,
            dispatcher: Dispatcher {
                topic: self.topic.clone(),
                subscriber,
                clock: Arc::clone(&self.clock),
                stop: stop.clone(),
            },
            shutdown: shutdown.clone(),
        };
        let running = RunningConsumer {
            handle: tokio::spawn(task.run()),
            state: state_rx,
            _guard: stop.clone().drop_guard(),
            stop,
        };

        let ready_timeout = self.ready_timeout;
        let wait_ready = async move {
            match ready_timeout {
                Some(limit) => matches!(tokio::time::timeout(limit, ready_rx).await, Ok(Ok(()))),
                None => ready_rx.await.is_ok(),
            }
        };

        let became_ready = tokio::select! {
            ready = wait_ready => ready,
            () = shutdown.cancelled() => false,
        };

        if became_ready {
            return Ok(running);
        }

        tracing::warn!(topic = %self.topic, "Consumer did not become ready");
        match running.stop().await {
            Err(e) => Err(e),
            Ok(()) => Err(EventBusError::ConsumerGroupError(format!(
                "consumer for '{}' stopped before the first partition assignment",
                self.topic
            ))),
        }
    }
}

/// Handle to a started consumer.
///
/// Dropping the handle asks the loop to stop but does not wait for it.
pub struct RunningConsumer {
    handle: JoinHandle<Result<(), EventBusError>>,
    state: watch::Receiver<ConsumerState>,
    stop: CancellationToken,
    _guard: DropGuard,
}

impl RunningConsumer {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// A receiver that follows state changes, including the final
    /// [`ConsumerState::Closed`] after [`stop`](Self::stop) has consumed
    /// this handle.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConsumerState> {
        self.state.clone()
    }

    /// Whether the background task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop consuming and wait for the background task to exit.
    ///
    /// A dispatch already in progress runs to completion first. When this
    /// returns, the consumer has left the group and its connection is
    /// released.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConsumerGroupError`] if the loop had already
    /// died from an unrecoverable broker error, or the task panicked.
    pub async fn stop(self) -> Result<(), EventBusError> {
        let Self { handle, stop, .. } = self;
        stop.cancel();

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(EventBusError::ConsumerGroupError(format!(
                "consumer task failed: {e}"
            ))),
        }
    }
}

/// What happened to one inbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Decoded and handed to the subscriber.
    Delivered,
    /// Published to a topic this consumer does not handle.
    ForeignTopic,
    /// The record had no payload.
    NoPayload,
    /// The payload was not a completion event.
    Malformed,
}

/// Turns inbound records into subscriber calls. Holds no broker state.
struct Dispatcher {
    topic: String,
    subscriber: Arc<dyn CompletionSubscriber>,
    clock: Arc<dyn Clock>,
    stop: CancellationToken,
}

impl Dispatcher {
    /// Handle one record. The subscriber call runs to completion even if
    /// `stop` fires meanwhile; the subscriber sees that through its token.
    async fn dispatch<M: Message>(&self, message: &M) -> Outcome {
        if message.topic() != self.topic {
            tracing::trace!(topic = message.topic(), "Ignoring record from unhandled topic");
            return Outcome::ForeignTopic;
        }

        let Some(payload) = message.payload() else {
            tracing::warn!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "Dropping record with no payload"
            );
            return Outcome::NoPayload;
        };

        match CompleteProcessing::decode(payload, self.clock.now()) {
            Ok(event) => {
                tracing::debug!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    message_id = %event.id,
                    "Dispatching completion"
                );
                self.subscriber
                    .on_processing_complete(event, self.stop.child_token())
                    .await;
                Outcome::Delivered
            },
            Err(e) => {
                tracing::warn!(
                    topic = message.topic(),
                    partition = message.partition(),
                    offset = message.offset(),
                    error = %e,
                    "Dropping malformed completion event"
                );
                Outcome::Malformed
            },
        }
    }
}

/// Next thing the consume loop acts on.
enum Step<T> {
    Stop,
    Fatal,
    Record(T),
}

/// Wait for the next step. Stop takes priority over a fatal error, and
/// both take priority over a record that is already available.
async fn next_step<F: Future>(
    stop: &CancellationToken,
    fatal: &CancellationToken,
    recv: F,
) -> Step<F::Output> {
    tokio::select! {
        biased;

        () = stop.cancelled() => Step::Stop,
        () = fatal.cancelled() => Step::Fatal,
        received = recv => Step::Record(received),
    }
}

/// State owned by the background task.
struct ConsumeLoop {
    consumer: StreamConsumer<CompletionContext>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
}

impl ConsumeLoop {
    async fn run(self) -> Result<(), EventBusError> {
        let result = self.consume().await;

        self.consumer.unsubscribe();
        self.consumer.context().set_state(ConsumerState::Closed);
        tracing::info!(topic = %self.dispatcher.topic, "Consumer closed");

        result
    }

    async fn consume(&self) -> Result<(), EventBusError> {
        let context = self.consumer.context();
        let topic = self.dispatcher.topic.as_str();
        let stop = &self.dispatcher.stop;

        loop {
            match next_step(stop, &context.fatal, self.consumer.recv()).await {
                Step::Stop => {
                    context.set_state(ConsumerState::Draining);
                    tracing::info!(topic, "Consumer draining");
                    return Ok(());
                },
                Step::Fatal => {
                    return Err(context.escalate(&self.shutdown, topic, context.fatal_reason()));
                },
                Step::Record(Ok(message)) => {
                    context.mark_consuming();
                    self.dispatcher.dispatch(&message).await;
                    self.commit(&message);
                },
                Step::Record(Err(_)) if stop.is_cancelled() => {
                    context.set_state(ConsumerState::Draining);
                    return Ok(());
                },
                Step::Record(Err(e)) if is_fatal(&e) => {
                    return Err(context.escalate(&self.shutdown, topic, e.to_string()));
                },
                Step::Record(Err(e)) => {
                    tracing::warn!(topic, error = %e, "Failed to receive record");
                },
            }
        }
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            tracing::warn!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                error = %e,
                "Failed to commit offset (record may be redelivered)"
            );
        }
    }
}

/// Builder for configuring a [`CompletionConsumer`].
#[derive(Default)]
pub struct CompletionConsumerBuilder {
    brokers: Option<String>,
    group_id: Option<String>,
    topic: Option<String>,
    auto_offset_reset: Option<String>,
    session_timeout: Option<Duration>,
    ready_timeout: Option<Duration>,
    clock: Option<Arc<dyn Clock>>,
}

impl CompletionConsumerBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the consumer group id.
    #[must_use]
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set the inbound topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set where a new group starts reading: `"earliest"` or `"latest"`.
    ///
    /// Default: `"latest"`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Set the group session timeout.
    ///
    /// Default: 6 seconds
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Give up on [`CompletionConsumer::start`] if no assignment arrives
    /// within `timeout`.
    ///
    /// Default: wait indefinitely
    #[must_use]
    pub const fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    /// Set the clock used to stamp `processed_at` on receipt.
    ///
    /// Default: [`SystemClock`]
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the [`CompletionConsumer`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers, group id or
    /// topic are not set.
    pub fn build(self) -> Result<CompletionConsumer, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let group_id = self.group_id.ok_or_else(|| {
            EventBusError::ConnectionFailed("Consumer group not configured".to_string())
        })?;
        let topic = self
            .topic
            .ok_or_else(|| EventBusError::ConnectionFailed("Topic not configured".to_string()))?;

        Ok(CompletionConsumer {
            brokers,
            group_id,
            topic,
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| DEFAULT_AUTO_OFFSET_RESET.to_string()),
            session_timeout: self.session_timeout.unwrap_or(DEFAULT_SESSION_TIMEOUT),
            ready_timeout: self.ready_timeout,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}
