use rdkafka::{
    config::ClientConfig,
    producer::{FutureProducer, FutureRecord},
};
use tracing::{debug, info};

use super::{KafkaSettings, Sink, SinkError};
use crate::transform::EncodedMessage;

/// Publishes messages to a single Kafka topic, waiting for each delivery report.
pub struct KafkaSink {
    producer: FutureProducer,
    settings: KafkaSettings,
}

impl KafkaSink {
    pub fn new(settings: &KafkaSettings) -> Result<Self, SinkError> {
        if settings.brokers.is_empty() {
            return Err(SinkError::NoBrokers);
        }

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", settings.brokers.join(","))
            .set("client.id", "loglet")
            .set("acks", "1")
            .set("retry.backoff.ms", "1000")
            .set(
                "message.timeout.ms",
                settings.send_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|source| SinkError::Producer { source })?;

        info!(brokers = ?settings.brokers, topic = %settings.topic, "kafka producer ready");
        Ok(Self {
            producer,
            settings: settings.clone(),
        })
    }
}

impl Sink for KafkaSink {
    async fn send(&mut self, message: &EncodedMessage) -> Result<(), SinkError> {
        let mut record = FutureRecord::<str, [u8]>::to(&self.settings.topic)
            .payload(message.payload.as_slice());
        if let Some(key) = message.key.as_deref() {
            record = record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(record, self.settings.send_timeout)
            .await
            .map_err(|(source, _)| SinkError::Delivery {
                topic: self.settings.topic.clone(),
                cursor: message.cursor.clone(),
                source,
            })?;

        debug!(cursor = %message.cursor, partition, offset, "delivered message");
        Ok(())
    }
}
