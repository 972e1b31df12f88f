use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{
    AccountId, OrderStatus, PaymentMethod, PaymentStatus, ProductId, Requester, ShippingAddress,
};

// ============================================================================
// Order Commands - Represent caller intent
// ============================================================================

/// Commands against an existing order, decided by [`super::Order::handle_command`].
#[derive(Debug, Clone)]
pub enum OrderCommand {
    UpdateStatus {
        status: OrderStatus,
        tracking_number: Option<String>,
        admin_note: Option<String>,
    },
    UpdatePayment {
        method: PaymentMethod,
        status: PaymentStatus,
        reference: Option<String>,
        paid_at: Option<DateTime<Utc>>,
    },
    Cancel {
        requested_by: Requester,
    },
}

// ============================================================================
// Request Payloads
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedLine {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price the client believes it is paying.
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub owner_id: AccountId,
    pub lines: Vec<RequestedLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub admin_note: Option<String>,
}

impl StatusUpdate {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status,
            tracking_number: None,
            admin_note: None,
        }
    }

    pub fn with_tracking_number(mut self, tracking_number: impl Into<String>) -> Self {
        self.tracking_number = Some(tracking_number.into());
        self
    }

    pub fn with_admin_note(mut self, note: impl Into<String>) -> Self {
        self.admin_note = Some(note.into());
        self
    }
}

/// Payment outcome as reported by the payment step; enumerations arrive as
/// raw strings and are validated by the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub method: String,
    pub status: String,
    pub reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentUpdate {
    pub fn new(method: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            status: status.into(),
            reference: None,
            paid_at: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}
