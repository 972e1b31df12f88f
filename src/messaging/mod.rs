// ============================================================================
// Messaging - Outbound order notifications
// ============================================================================
//
// Committed order events are wrapped in an `EventEnvelope` and handed to a
// `NotificationSink`. Delivery is best-effort: the `EventPublisher` retries
// and trips a circuit breaker, but never fails the order operation that
// produced the events.
//
// ============================================================================

mod envelope;
mod publisher;
#[cfg(feature = "redpanda")]
mod redpanda;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::domain::order::OrderEvent;

pub use envelope::EventEnvelope;
pub use publisher::EventPublisher;
#[cfg(feature = "redpanda")]
pub use redpanda::RedpandaSink;

pub type OrderNotification = EventEnvelope<OrderEvent>;

/// Implemented by events that travel inside an [`EventEnvelope`].
pub trait DomainEvent: Serialize + Clone + Send + Sync {
    fn event_type(&self) -> &'static str;

    fn event_version(&self) -> i32 {
        1
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, notification: &OrderNotification) -> anyhow::Result<()>;
}

/// Logs each notification at info level.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn publish(&self, notification: &OrderNotification) -> anyhow::Result<()> {
        tracing::info!(
            event_type = %notification.event_type,
            order_id = %notification.aggregate_id,
            sequence = notification.sequence_number,
            correlation_id = %notification.correlation_id,
            "Order notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    published: Mutex<Vec<OrderNotification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<OrderNotification> {
        self.published.lock().await.clone()
    }

    pub async fn event_types(&self) -> Vec<String> {
        self.published
            .lock()
            .await
            .iter()
            .map(|n| n.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn publish(&self, notification: &OrderNotification) -> anyhow::Result<()> {
        self.published.lock().await.push(notification.clone());
        Ok(())
    }
}
