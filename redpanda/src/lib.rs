//! Redpanda transport for the msgflow message lifecycle.
//!
//! Two independent components, each owning its own broker connection:
//!
//! - [`RedpandaProducer`]: publishes `StartProcessing` events to the outbound
//!   topic and waits for the broker's acknowledgement.
//! - [`CompletionConsumer`]: joins a consumer group on the inbound topic and
//!   hands every decoded `CompleteProcessing` event to a
//!   [`CompletionSubscriber`](msgflow_core::event_bus::CompletionSubscriber).
//!
//! Both use rdkafka, so any Kafka-compatible broker works (Redpanda, Apache
//! Kafka, MSK).
//!
//! # Architecture
//!
//! ```text
//!   MessageService::create
//!          │
//!          ▼
//! ┌──────────────────┐        processing-messages        ┌────────────┐
//! │ RedpandaProducer │ ─────────────────────────────────► │            │
//! └──────────────────┘                                   │  pipeline  │
//! ┌────────────────────┐      processed-messages         │            │
//! │ CompletionConsumer │ ◄───────────────────────────────│            │
//! └─────────┬──────────┘                                 └────────────┘
//!           │ on_processing_complete
//!           ▼
//!   MessageService::record_completion
//! ```
//!
//! # Delivery Semantics
//!
//! - **Publish**: one send per call, no retries. The caller sees every
//!   broker failure.
//! - **Consume**: offsets are committed after the subscriber returns, so a
//!   crash mid-dispatch redelivers the record. Records from one partition are
//!   dispatched one at a time, in order.
//! - **Malformed records** are logged and skipped.
//!
//! # Example
//!
//! ```no_run
//! use msgflow_redpanda::{CompletionConsumer, RedpandaProducer};
//! use msgflow_core::environment::SystemClock;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(subscriber: Arc<dyn msgflow_core::CompletionSubscriber>) -> Result<(), Box<dyn std::error::Error>> {
//! let producer = RedpandaProducer::builder()
//!     .brokers("localhost:9092")
//!     .topic("processing-messages")
//!     .build()?;
//!
//! let consumer = CompletionConsumer::builder()
//!     .brokers("localhost:9092")
//!     .group_id("message-service")
//!     .topic("processed-messages")
//!     .clock(Arc::new(SystemClock))
//!     .build()?;
//!
//! let shutdown = CancellationToken::new();
//! let running = consumer.start(subscriber, shutdown.clone()).await?;
//!
//! // ... serve traffic ...
//!
//! running.stop().await?;
//! producer.close(std::time::Duration::from_secs(5))?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod consumer;
mod producer;

pub use consumer::{CompletionConsumer, CompletionConsumerBuilder, ConsumerState, RunningConsumer};
pub use producer::{PartitionKey, RedpandaProducer, RedpandaProducerBuilder};
