use rust_decimal::Decimal;

use super::value_objects::{OrderId, OrderStatus, ProductId};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Product {name} ({product_id}) is unavailable: {reason}")]
    ProductUnavailable {
        product_id: ProductId,
        name: String,
        reason: Unavailability,
    },

    #[error("Price mismatch for product {product_id}: catalog price is {expected}, request carried {supplied}")]
    PriceMismatch {
        product_id: ProductId,
        expected: Decimal,
        supplied: Decimal,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Order {order_id} cannot be cancelled: {reason}")]
    OrderNotCancellable {
        order_id: OrderId,
        reason: CancelRefusal,
    },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid payment status: {0}")]
    InvalidPaymentStatus(String),

    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    #[error("Order items cannot be empty")]
    EmptyOrder,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    #[error("Caller may not access order {0}")]
    Forbidden(OrderId),

    #[error("Order {0} was modified concurrently")]
    ConcurrentModification(OrderId),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl OrderError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::ProductUnavailable { .. } => "product_unavailable",
            OrderError::PriceMismatch { .. } => "price_mismatch",
            OrderError::OrderNotFound(_) => "order_not_found",
            OrderError::OrderNotCancellable { .. } => "order_not_cancellable",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::InvalidPaymentStatus(_) => "invalid_payment_status",
            OrderError::InvalidPaymentMethod(_) => "invalid_payment_method",
            OrderError::EmptyOrder => "empty_order",
            OrderError::InvalidQuantity { .. } => "invalid_quantity",
            OrderError::Forbidden(_) => "forbidden",
            OrderError::ConcurrentModification(_) => "concurrent_modification",
            OrderError::Backend(_) => "backend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Unavailability {
    #[error("product is not active")]
    Inactive,

    #[error("requested {requested}, only {available} in stock")]
    InsufficientStock { requested: u32, available: u32 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CancelRefusal {
    #[error("requester does not own the order")]
    NotOwner,

    #[error("order is already {0}")]
    Status(OrderStatus),
}
