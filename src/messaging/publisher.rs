use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{NotificationSink, OrderNotification};
use crate::domain::order::{Order, OrderEvent};
use crate::metrics::Metrics;
use crate::utils::{retry_with_backoff, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, RetryPolicy};

/// Wraps committed events in envelopes and pushes them to the sink.
pub struct EventPublisher {
    sink: Arc<dyn NotificationSink>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl EventPublisher {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        retry: RetryPolicy,
        breaker: CircuitBreakerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            sink,
            retry,
            breaker: CircuitBreaker::new(breaker),
            metrics,
        }
    }

    /// Build one envelope per event, all sharing a correlation id.
    pub fn envelopes(
        order: &Order,
        events: Vec<OrderEvent>,
        user_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Vec<OrderNotification> {
        let correlation_id = Uuid::new_v4();

        events
            .into_iter()
            .map(|event| {
                let envelope = OrderNotification::new(order.id, order.version, event, correlation_id, at)
                    .with_metadata("order_number", order.order_number.as_str());
                match user_id {
                    Some(user_id) => envelope.with_user(user_id),
                    None => envelope,
                }
            })
            .collect()
    }

    /// Deliver events committed for `order`. Failures are logged and counted,
    /// never returned.
    pub async fn publish(
        &self,
        order: &Order,
        events: Vec<OrderEvent>,
        user_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) {
        for envelope in Self::envelopes(order, events, user_id, at) {
            self.deliver(&envelope).await;
        }
    }

    async fn deliver(&self, envelope: &OrderNotification) {
        let sink = &self.sink;
        let metrics = &self.metrics;

        let delivery = retry_with_backoff(&self.retry, "notify", move |attempt| {
            metrics.record_notification_attempt(attempt);
            sink.publish(envelope)
        });

        let outcome = self.breaker.call(delivery).await;
        self.metrics
            .set_circuit_breaker_state(self.breaker.state().await.as_gauge());

        match outcome {
            Ok(()) => {
                self.metrics.record_notification(&envelope.event_type, Ok(()));
            }
            Err(CircuitBreakerError::Open) => {
                tracing::warn!(
                    event_type = %envelope.event_type,
                    order_id = %envelope.aggregate_id,
                    "Notification dropped, circuit breaker open"
                );
                self.metrics
                    .record_notification(&envelope.event_type, Err("circuit_open"));
            }
            Err(CircuitBreakerError::Failed(e)) => {
                tracing::error!(
                    error = %e,
                    event_type = %envelope.event_type,
                    order_id = %envelope.aggregate_id,
                    "Notification dropped after retries"
                );
                self.metrics
                    .record_notification(&envelope.event_type, Err("delivery_failed"));
            }
        }
    }
}
