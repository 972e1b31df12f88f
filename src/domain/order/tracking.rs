use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::aggregate::Order;
use super::value_objects::{OrderNumber, OrderStatus, PaymentStatus};

// ============================================================================
// Order Tracking Projection
// ============================================================================
//
// Read-only timeline derived from the stored status timestamps. Recomputed
// on every read and never written back.
//
// ============================================================================

const PROCESSING_ESTIMATE_HOURS: i64 = 2;
const SHIPPING_ESTIMATE_HOURS: i64 = 24;
const DELIVERY_ESTIMATE_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub status: OrderStatus,
    pub date: DateTime<Utc>,
    pub description: String,
    /// True only when `date` is a recorded timestamp rather than an estimate.
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedLine {
    pub name: String,
    pub quantity: u32,
}

/// Public view of an order; carries no owner, contact or street details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingView {
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub tracking_number: String,
    pub destination_city: String,
    pub items: Vec<TrackedLine>,
    pub history: Vec<TrackingEntry>,
    pub estimated_delivery: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub fn project(order: &Order) -> TrackingView {
    TrackingView {
        order_number: order.order_number.clone(),
        status: order.status,
        payment_status: order.payment_status,
        tracking_number: order
            .tracking_number
            .clone()
            .unwrap_or_else(|| format!("TRK{}", order.order_number.digits())),
        destination_city: order.shipping_address.city.clone(),
        items: order
            .items
            .iter()
            .map(|line| TrackedLine {
                name: line.name.clone(),
                quantity: line.quantity,
            })
            .collect(),
        history: history(order),
        estimated_delivery: estimated_delivery(order),
        created_at: order.created_at,
    }
}

pub fn estimated_delivery(order: &Order) -> DateTime<Utc> {
    match (order.status, order.delivered_at) {
        (OrderStatus::Delivered, Some(delivered_at)) => delivered_at,
        _ => order.created_at + Duration::days(DELIVERY_ESTIMATE_DAYS),
    }
}

pub fn history(order: &Order) -> Vec<TrackingEntry> {
    let created = order.created_at;
    let rank = progress_rank(order.status);

    let mut entries = vec![TrackingEntry {
        status: OrderStatus::Pending,
        date: created,
        description: description(OrderStatus::Pending).to_string(),
        completed: true,
    }];

    let stages = [
        (
            OrderStatus::Processing,
            order.processing_at,
            created + Duration::hours(PROCESSING_ESTIMATE_HOURS),
        ),
        (
            OrderStatus::Shipped,
            order.shipped_at,
            created + Duration::hours(SHIPPING_ESTIMATE_HOURS),
        ),
        (
            OrderStatus::Delivered,
            order.delivered_at,
            created + Duration::days(DELIVERY_ESTIMATE_DAYS),
        ),
    ];

    for (status, recorded, estimate) in stages {
        let reached = rank >= progress_rank(status) || recorded.is_some();
        if reached {
            entries.push(entry(status, recorded, estimate));
        }
    }

    if order.status == OrderStatus::Cancelled {
        entries.push(entry(OrderStatus::Cancelled, order.cancelled_at, order.updated_at));
    }

    entries
}

fn entry(status: OrderStatus, recorded: Option<DateTime<Utc>>, estimate: DateTime<Utc>) -> TrackingEntry {
    TrackingEntry {
        status,
        date: recorded.unwrap_or(estimate),
        description: description(status).to_string(),
        completed: recorded.is_some(),
    }
}

/// Position along the forward path; cancelled orders sit before processing
/// so only recorded stages show up for them.
fn progress_rank(status: OrderStatus) -> u8 {
    match status {
        OrderStatus::Pending | OrderStatus::Cancelled => 0,
        OrderStatus::Processing => 1,
        OrderStatus::Shipped => 2,
        OrderStatus::Delivered => 3,
    }
}

fn description(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Order placed and awaiting confirmation",
        OrderStatus::Processing => "Your oils are being prepared and packed",
        OrderStatus::Shipped => "Order handed to the carrier",
        OrderStatus::Delivered => "Order delivered",
        OrderStatus::Cancelled => "Order cancelled",
    }
}
