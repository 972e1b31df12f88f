use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::OrderCommand;
use super::errors::{CancelRefusal, OrderError};
use super::events::*;
use super::value_objects::{
    AccountId, AdminNote, OrderId, OrderLine, OrderNumber, OrderStatus, PaymentMethod,
    PaymentStatus, ShippingAddress,
};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub owner_id: AccountId,
    pub version: i64,

    // Immutable purchase snapshot
    pub items: Vec<OrderLine>,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub notes: Option<String>,

    // Fulfillment
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub admin_notes: Vec<AdminNote>,

    // Payment
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,

    // Status timestamps, each stamped once
    pub processing_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,

    /// Stock a cancelled order still owes the catalog. Set in the same write
    /// that cancels the order, cleared once a caller takes over giving it back.
    #[serde(default)]
    pub pending_restock: Vec<StockMovement>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated contents of a new order, produced by checkout pricing.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub owner_id: AccountId,
    pub items: Vec<OrderLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

impl Order {
    pub fn new(draft: OrderDraft, order_number: OrderNumber, now: DateTime<Utc>) -> Self {
        let total = draft.items.iter().map(OrderLine::line_total).sum();

        Self {
            id: Uuid::now_v7(),
            order_number,
            owner_id: draft.owner_id,
            version: 1,
            items: draft.items,
            total,
            shipping_address: draft.shipping_address,
            notes: draft.notes,
            status: OrderStatus::Pending,
            tracking_number: None,
            admin_notes: Vec::new(),
            payment_status: PaymentStatus::Pending,
            payment_method: draft.payment_method,
            payment_reference: None,
            paid_at: None,
            processing_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            pending_restock: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stock_movements(&self) -> Vec<StockMovement> {
        self.items
            .iter()
            .map(|line| StockMovement {
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect()
    }

    pub fn placed_event(&self) -> OrderEvent {
        OrderEvent::Placed(OrderPlaced {
            order_number: self.order_number.clone(),
            owner_id: self.owner_id,
            total: self.total,
            lines: self.stock_movements(),
        })
    }

    /// Decide which events a command produces. Never mutates.
    pub fn handle_command(
        &self,
        command: &OrderCommand,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        match command {
            OrderCommand::UpdateStatus { status, tracking_number, admin_note } => {
                if !self.status.can_transition_to(*status) {
                    return Err(OrderError::InvalidTransition {
                        from: self.status,
                        to: *status,
                    });
                }

                let mut events = Vec::new();

                if *status != self.status {
                    events.push(self.status_changed(*status, now));
                }

                if let Some(tracking_number) = non_blank(tracking_number) {
                    if self.tracking_number.as_deref() != Some(tracking_number) {
                        events.push(OrderEvent::TrackingNumberAssigned(OrderTrackingNumberAssigned {
                            tracking_number: tracking_number.to_string(),
                        }));
                    }
                }

                if let Some(note) = non_blank(admin_note) {
                    events.push(note_appended(now, note));
                }

                Ok(events)
            }

            OrderCommand::UpdatePayment { method, status, reference, paid_at } => {
                let paid_at = match status {
                    PaymentStatus::Paid => (*paid_at).or(self.paid_at).or(Some(now)),
                    _ => *paid_at,
                };

                let mut events = vec![OrderEvent::PaymentUpdated(OrderPaymentUpdated {
                    method: *method,
                    status: *status,
                    reference: reference.clone(),
                    paid_at,
                })];

                match (status, self.status) {
                    // The one place payment drives fulfillment.
                    (PaymentStatus::Paid, OrderStatus::Pending) => {
                        events.push(self.status_changed(OrderStatus::Processing, now));
                    }
                    (PaymentStatus::Failed, OrderStatus::Pending) => {
                        events.push(note_appended(
                            now,
                            &format!(
                                "Payment failed via {}{}; order left pending for retry",
                                method,
                                reference_suffix(reference.as_deref()),
                            ),
                        ));
                    }
                    (PaymentStatus::Refunded, _) => {
                        events.push(note_appended(
                            now,
                            &format!(
                                "Payment refunded via {}{} while order was {}; no automatic cancellation or restock",
                                method,
                                reference_suffix(reference.as_deref()),
                                self.status,
                            ),
                        ));
                    }
                    _ => {}
                }

                Ok(events)
            }

            OrderCommand::Cancel { requested_by } => {
                if !requested_by.can_access(self.owner_id) {
                    return Err(OrderError::OrderNotCancellable {
                        order_id: self.id,
                        reason: CancelRefusal::NotOwner,
                    });
                }

                if !self.status.is_cancellable() {
                    return Err(OrderError::OrderNotCancellable {
                        order_id: self.id,
                        reason: CancelRefusal::Status(self.status),
                    });
                }

                Ok(vec![self.status_changed(OrderStatus::Cancelled, now)])
            }
        }
    }

    pub fn apply_event(&mut self, event: &OrderEvent) {
        match event {
            OrderEvent::Placed(_) | OrderEvent::StockRestored(_) => {
                // Creation and restock do not change the stored order
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                let stamp = match e.to {
                    OrderStatus::Pending => None,
                    OrderStatus::Processing => Some(&mut self.processing_at),
                    OrderStatus::Shipped => Some(&mut self.shipped_at),
                    OrderStatus::Delivered => Some(&mut self.delivered_at),
                    OrderStatus::Cancelled => Some(&mut self.cancelled_at),
                };
                if let Some(slot) = stamp {
                    slot.get_or_insert(e.at);
                }
                if e.to == OrderStatus::Cancelled && e.from != OrderStatus::Cancelled {
                    self.pending_restock = self.stock_movements();
                }
            }
            OrderEvent::PaymentUpdated(e) => {
                self.payment_method = e.method;
                self.payment_status = e.status;
                if let Some(reference) = &e.reference {
                    self.payment_reference = Some(reference.clone());
                }
                if let Some(paid_at) = e.paid_at {
                    self.paid_at = Some(paid_at);
                }
            }
            OrderEvent::TrackingNumberAssigned(e) => {
                self.tracking_number = Some(e.tracking_number.clone());
            }
            OrderEvent::AdminNoteAppended(e) => {
                self.admin_notes.push(e.note.clone());
            }
        }
    }

    /// Apply a batch of events and bump `updated_at`.
    pub fn apply_events(&mut self, events: &[OrderEvent], now: DateTime<Utc>) {
        for event in events {
            self.apply_event(event);
        }
        self.updated_at = now;
    }

    fn status_changed(&self, to: OrderStatus, at: DateTime<Utc>) -> OrderEvent {
        OrderEvent::StatusChanged(OrderStatusChanged {
            from: self.status,
            to,
            at,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn note_appended(at: DateTime<Utc>, text: &str) -> OrderEvent {
    OrderEvent::AdminNoteAppended(OrderAdminNoteAppended {
        note: AdminNote::new(at, text),
    })
}

fn reference_suffix(reference: Option<&str>) -> String {
    reference.map(|r| format!(" (ref {r})")).unwrap_or_default()
}

// ============================================================================
// Order Changes - The mutable fields written back by update_by_id
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderChanges {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub tracking_number: Option<String>,
    pub appended_notes: Vec<AdminNote>,
    pub processing_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Replaces the owed stock list when set.
    pub pending_restock: Option<Vec<StockMovement>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderChanges {
    /// Replace the owed stock list, leaving everything else untouched.
    pub fn restock(owed: Vec<StockMovement>, now: DateTime<Utc>) -> Self {
        Self {
            pending_restock: Some(owed),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Fields that differ between a loaded order and its updated copy.
    pub fn between(before: &Order, after: &Order) -> Self {
        fn changed<T: Clone + PartialEq>(old: &T, new: &T) -> Option<T> {
            (old != new).then(|| new.clone())
        }
        fn newly_set<T: Clone + PartialEq>(old: &Option<T>, new: &Option<T>) -> Option<T> {
            if old != new { new.clone() } else { None }
        }

        Self {
            status: changed(&before.status, &after.status),
            payment_status: changed(&before.payment_status, &after.payment_status),
            payment_method: changed(&before.payment_method, &after.payment_method),
            payment_reference: newly_set(&before.payment_reference, &after.payment_reference),
            paid_at: newly_set(&before.paid_at, &after.paid_at),
            tracking_number: newly_set(&before.tracking_number, &after.tracking_number),
            appended_notes: after
                .admin_notes
                .get(before.admin_notes.len()..)
                .map(<[AdminNote]>::to_vec)
                .unwrap_or_default(),
            processing_at: newly_set(&before.processing_at, &after.processing_at),
            shipped_at: newly_set(&before.shipped_at, &after.shipped_at),
            delivered_at: newly_set(&before.delivered_at, &after.delivered_at),
            cancelled_at: newly_set(&before.cancelled_at, &after.cancelled_at),
            pending_restock: changed(&before.pending_restock, &after.pending_restock),
            updated_at: changed(&before.updated_at, &after.updated_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write these fields onto a stored order and bump its version.
    pub fn apply_to(&self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(payment_status) = self.payment_status {
            order.payment_status = payment_status;
        }
        if let Some(payment_method) = self.payment_method {
            order.payment_method = payment_method;
        }
        if let Some(reference) = &self.payment_reference {
            order.payment_reference = Some(reference.clone());
        }
        if let Some(paid_at) = self.paid_at {
            order.paid_at = Some(paid_at);
        }
        if let Some(tracking_number) = &self.tracking_number {
            order.tracking_number = Some(tracking_number.clone());
        }
        order.admin_notes.extend(self.appended_notes.iter().cloned());
        if let Some(at) = self.processing_at {
            order.processing_at = Some(at);
        }
        if let Some(at) = self.shipped_at {
            order.shipped_at = Some(at);
        }
        if let Some(at) = self.delivered_at {
            order.delivered_at = Some(at);
        }
        if let Some(at) = self.cancelled_at {
            order.cancelled_at = Some(at);
        }
        if let Some(owed) = &self.pending_restock {
            order.pending_restock = owed.clone();
        }
        if let Some(at) = self.updated_at {
            order.updated_at = at;
        }
        order.version += 1;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
