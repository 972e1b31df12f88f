use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::messaging::DomainEvent;
use super::value_objects::{
    AccountId, AdminNote, OrderNumber, OrderStatus, PaymentMethod, PaymentStatus, ProductId,
};

// ============================================================================
// Order Events - Facts emitted by the order engine
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    StatusChanged(OrderStatusChanged),
    PaymentUpdated(OrderPaymentUpdated),
    TrackingNumberAssigned(OrderTrackingNumberAssigned),
    AdminNoteAppended(OrderAdminNoteAppended),
    StockRestored(OrderStockRestored),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::PaymentUpdated(_) => "OrderPaymentUpdated",
            OrderEvent::TrackingNumberAssigned(_) => "OrderTrackingNumberAssigned",
            OrderEvent::AdminNoteAppended(_) => "OrderAdminNoteAppended",
            OrderEvent::StockRestored(_) => "OrderStockRestored",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderPlaced {
    pub order_number: OrderNumber,
    pub owner_id: AccountId,
    pub total: Decimal,
    pub lines: Vec<StockMovement>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderStatusChanged {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderPaymentUpdated {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderTrackingNumberAssigned {
    pub tracking_number: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderAdminNoteAppended {
    pub note: AdminNote,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderStockRestored {
    pub lines: Vec<StockMovement>,
}

/// Units of one product taken from, or given back to, the catalog.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub quantity: u32,
}
