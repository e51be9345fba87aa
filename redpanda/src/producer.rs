//! Outbound `StartProcessing` publisher.

use msgflow_core::event_bus::{EventBusError, StartProcessingPublisher};
use msgflow_core::StartProcessing;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_ACKS: &str = "1";
const DEFAULT_COMPRESSION: &str = "none";

/// How the record key of each published event is chosen.
///
/// The key only drives broker-side partitioning. Consumers must not rely on
/// it for idempotence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionKey {
    /// A fresh UUIDv4 per publish. Events spread evenly across partitions.
    #[default]
    Random,
    /// The message id. Every event for one message lands on one partition.
    MessageId,
}

impl PartitionKey {
    fn key_for(self, event: &StartProcessing) -> String {
        match self {
            Self::Random => Uuid::new_v4().to_string(),
            Self::MessageId => event.id.to_string(),
        }
    }
}

/// Publishes [`StartProcessing`] events to a single outbound topic.
///
/// Each publish waits for the broker's acknowledgement. librdkafka's own
/// retries are disabled (`retries=0`), so a transient broker error reaches
/// the caller immediately.
///
/// # Example
///
/// ```no_run
/// use msgflow_redpanda::{PartitionKey, RedpandaProducer};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let producer = RedpandaProducer::builder()
///     .brokers("localhost:9092")
///     .topic("processing-messages")
///     .acks("all")
///     .timeout(Duration::from_secs(10))
///     .partition_key(PartitionKey::MessageId)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaProducer {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
    partition_key: PartitionKey,
    closed: AtomicBool,
}

impl RedpandaProducer {
    /// Create a new builder for configuring the producer.
    #[must_use]
    pub fn builder() -> RedpandaProducerBuilder {
        RedpandaProducerBuilder::default()
    }

    /// The outbound topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Flush queued records and refuse further publishes.
    ///
    /// This call blocks the current thread for up to `timeout`. The
    /// connection itself is released when the producer is dropped. The
    /// caller must make sure no publish is in flight.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::CloseFailed`] if the producer was already
    /// closed or the flush did not finish in time.
    pub fn close(&self, timeout: Duration) -> Result<(), EventBusError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(EventBusError::CloseFailed(
                "producer already closed".to_string(),
            ));
        }

        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| EventBusError::CloseFailed(format!("Failed to flush producer: {e}")))?;

        tracing::info!(topic = %self.topic, "Producer closed");
        Ok(())
    }
}

impl StartProcessingPublisher for RedpandaProducer {
    fn publish_start_processing(
        &self,
        event: &StartProcessing,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let event = event.clone();

        Box::pin(async move {
            if self.is_closed() {
                return Err(EventBusError::PublishFailed {
                    topic: self.topic.clone(),
                    reason: "producer is closed".to_string(),
                });
            }

            let payload = event.to_json().map_err(|e| EventBusError::PublishFailed {
                topic: self.topic.clone(),
                reason: e.to_string(),
            })?;
            let key = self.partition_key.key_for(&event);

            let record = FutureRecord::to(&self.topic).payload(&payload).key(&key);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %self.topic,
                        partition = partition,
                        offset = offset,
                        message_id = %event.id,
                        key = %key,
                        "Start event published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %self.topic,
                        message_id = %event.id,
                        error = %kafka_error,
                        "Failed to publish start event"
                    );
                    Err(EventBusError::PublishFailed {
                        topic: self.topic.clone(),
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }
}

/// Builder for configuring a [`RedpandaProducer`].
#[derive(Default)]
pub struct RedpandaProducerBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    partition_key: PartitionKey,
}

impl RedpandaProducerBuilder {
    /// Set the broker addresses (comma-separated, e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the outbound topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"1"` (leader ack)
    #[must_use]
    pub fn acks(mut self, acks: impl Into<String>) -> Self {
        self.acks = Some(acks.into());
        self
    }

    /// Set the compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set how long a publish may wait for acknowledgement.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the record key strategy.
    ///
    /// Default: [`PartitionKey::Random`]
    #[must_use]
    pub const fn partition_key(mut self, partition_key: PartitionKey) -> Self {
        self.partition_key = partition_key;
        self
    }

    /// Build the [`RedpandaProducer`].
    ///
    /// librdkafka connects lazily, so a reachable broker is not required
    /// here.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if brokers or topic are
    /// not set, or the client configuration is rejected.
    pub fn build(self) -> Result<RedpandaProducer, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let topic = self
            .topic
            .ok_or_else(|| EventBusError::ConnectionFailed("Topic not configured".to_string()))?;
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let acks = self.acks.as_deref().unwrap_or(DEFAULT_ACKS);
        let compression = self.compression.as_deref().unwrap_or(DEFAULT_COMPRESSION);

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .set("retries", "0")
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        tracing::info!(
            brokers = %brokers,
            topic = %topic,
            acks = acks,
            compression = compression,
            partition_key = ?self.partition_key,
            "RedpandaProducer created"
        );

        Ok(RedpandaProducer {
            producer,
            topic,
            timeout,
            partition_key: self.partition_key,
            closed: AtomicBool::new(false),
        })
    }
}
