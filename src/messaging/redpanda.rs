use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use super::{NotificationSink, OrderNotification};
use crate::config::RedpandaSettings;

/// Publishes order notifications to a Redpanda topic, keyed by order id.
pub struct RedpandaSink {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl RedpandaSink {
    pub fn new(settings: &RedpandaSettings) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &settings.brokers)
            .set("message.timeout.ms", settings.message_timeout_ms.to_string())
            .create()?;

        tracing::info!(brokers = %settings.brokers, topic = %settings.topic, "Redpanda producer ready");

        Ok(Self {
            producer,
            topic: settings.topic.clone(),
            send_timeout: Duration::from_millis(settings.message_timeout_ms),
        })
    }
}

#[async_trait]
impl NotificationSink for RedpandaSink {
    async fn publish(&self, notification: &OrderNotification) -> Result<()> {
        let key = notification.key();
        let payload = notification.to_json()?;

        let record = FutureRecord::to(&self.topic)
            .key(&key)
            .payload(&payload)
            .headers(
                rdkafka::message::OwnedHeaders::new().insert(rdkafka::message::Header {
                    key: "event_type",
                    value: Some(notification.event_type.as_str()),
                }),
            );

        self.producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _)| anyhow::anyhow!("Redpanda send error: {e}"))?;

        tracing::debug!(
            topic = %self.topic,
            key = %key,
            event_type = %notification.event_type,
            "Published to Redpanda"
        );
        Ok(())
    }
}
