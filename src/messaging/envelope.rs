use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DomainEvent;

// ============================================================================
// Event Envelope - Notification metadata
// ============================================================================
//
// Wraps a committed domain event with the identity, ordering and tracing
// metadata downstream consumers need.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    /// Stored version of the aggregate once this event was committed.
    pub sequence_number: i64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Correlation: all events committed by one operation share this id
    pub correlation_id: Uuid,
    pub user_id: Option<Uuid>,

    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_data: E,
        correlation_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id,
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_version: event_data.event_version(),
            event_data,
            correlation_id,
            user_id: None,
            timestamp,
            metadata: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Partition key for ordered delivery per aggregate.
    pub fn key(&self) -> String {
        self.aggregate_id.to_string()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderEvent, OrderTrackingNumberAssigned};
    use chrono::TimeZone;

    fn tracking_event() -> OrderEvent {
        OrderEvent::TrackingNumberAssigned(OrderTrackingNumberAssigned {
            tracking_number: "SEUR-77".to_string(),
        })
    }

    #[test]
    fn test_envelope_takes_type_from_event() {
        let order_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2026, 5, 14, 9, 0, 0).unwrap();

        let envelope = EventEnvelope::new(order_id, 3, tracking_event(), correlation_id, at)
            .with_metadata("order_number", "ORD2605140001");

        assert_eq!(envelope.event_type, "OrderTrackingNumberAssigned");
        assert_eq!(envelope.event_version, 1);
        assert_eq!(envelope.sequence_number, 3);
        assert_eq!(envelope.key(), order_id.to_string());
        assert_eq!(envelope.metadata["order_number"], "ORD2605140001");
    }

    #[test]
    fn test_envelope_json_carries_tagged_payload() {
        let at = Utc.with_ymd_and_hms(2026, 5, 14, 9, 0, 0).unwrap();
        let envelope = EventEnvelope::new(Uuid::new_v4(), 2, tracking_event(), Uuid::new_v4(), at);

        let json: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(json["event_data"]["type"], "TrackingNumberAssigned");
        assert_eq!(json["event_data"]["data"]["tracking_number"], "SEUR-77");
    }
}
