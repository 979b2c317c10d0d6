//! Delivery targets for encoded messages.

use std::{future::Future, time::Duration};

use journal_export::Cursor;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::transform::EncodedMessage;

#[cfg(feature = "kafka")]
mod kafka;

#[cfg(feature = "kafka")]
pub use kafka::KafkaSink;

pub const DEFAULT_BROKER: &str = "localhost:9092";
pub const DEFAULT_TOPIC: &str = "logs";
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write message {cursor}: {source}")]
    Write {
        cursor: Cursor,
        #[source]
        source: std::io::Error,
    },
    #[error("loglet was built without the `kafka` feature")]
    KafkaDisabled,
    #[error("at least one broker is required")]
    NoBrokers,
    #[cfg(feature = "kafka")]
    #[error("failed to create kafka producer: {source}")]
    Producer {
        #[source]
        source: rdkafka::error::KafkaError,
    },
    #[cfg(feature = "kafka")]
    #[error("failed to deliver message {cursor} to topic `{topic}`: {source}")]
    Delivery {
        topic: String,
        cursor: Cursor,
        #[source]
        source: rdkafka::error::KafkaError,
    },
}

/// Destination that accepts one encoded message at a time.
///
/// `send` resolves only once the destination accepted the message; the caller treats `Ok` as
/// permission to advance the committed cursor past it.
pub trait Sink: Send + 'static {
    fn send(
        &mut self,
        message: &EncodedMessage,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Accepts and drops every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardSink;

impl Sink for DiscardSink {
    async fn send(&mut self, message: &EncodedMessage) -> Result<(), SinkError> {
        trace!(cursor = %message.cursor, bytes = message.payload.len(), "discarded message");
        Ok(())
    }
}

/// Writes each payload followed by a newline, flushing after every message.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> Sink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: &EncodedMessage) -> Result<(), SinkError> {
        let write_error = |source| SinkError::Write {
            cursor: message.cursor.clone(),
            source,
        };
        self.writer
            .write_all(&message.payload)
            .await
            .map_err(write_error)?;
        self.writer.write_all(b"\n").await.map_err(write_error)?;
        self.writer.flush().await.map_err(write_error)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Kafka,
    Stdout,
    Discard,
}

/// Connection settings for the Kafka sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KafkaSettings {
    pub brokers: Vec<String>,
    pub topic: String,
    /// Upper bound on how long a single delivery may take, retries included.
    pub send_timeout: Duration,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            brokers: vec![DEFAULT_BROKER.to_string()],
            topic: DEFAULT_TOPIC.to_string(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// The sink selected at startup.
pub enum ConfiguredSink {
    #[cfg(feature = "kafka")]
    Kafka(KafkaSink),
    Stdout(WriterSink<tokio::io::Stdout>),
    Discard(DiscardSink),
}

impl ConfiguredSink {
    pub fn build(kind: SinkKind, kafka: &KafkaSettings) -> Result<Self, SinkError> {
        match kind {
            SinkKind::Stdout => Ok(Self::Stdout(WriterSink::stdout())),
            SinkKind::Discard => Ok(Self::Discard(DiscardSink)),
            SinkKind::Kafka => Self::kafka(kafka),
        }
    }

    #[cfg(feature = "kafka")]
    fn kafka(settings: &KafkaSettings) -> Result<Self, SinkError> {
        KafkaSink::new(settings).map(Self::Kafka)
    }

    #[cfg(not(feature = "kafka"))]
    fn kafka(_settings: &KafkaSettings) -> Result<Self, SinkError> {
        Err(SinkError::KafkaDisabled)
    }
}

impl Sink for ConfiguredSink {
    async fn send(&mut self, message: &EncodedMessage) -> Result<(), SinkError> {
        match self {
            #[cfg(feature = "kafka")]
            Self::Kafka(sink) => sink.send(message).await,
            Self::Stdout(sink) => sink.send(message).await,
            Self::Discard(sink) => sink.send(message).await,
        }
    }
}
