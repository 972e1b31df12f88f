// ============================================================================
// Order Persistence - Store seams and their backends
// ============================================================================
//
// `OrderStore` and `OrderSequence` are the narrow persistence interfaces the
// order engine depends on. Two backends implement them (and `Catalog`):
// - memory/  - tokio-synchronised maps, for tests and embedding
// - scylladb/ - ScyllaDB with lightweight transactions for the conditional
//               writes (stock, day sequence, order version, order number)
//
// ============================================================================

pub mod memory;
pub mod scylladb;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::domain::order::{
    AccountId, Order, OrderChanges, OrderId, OrderNumber, OrderStatus,
};

pub use memory::{InMemoryCatalog, InMemoryOrderSequence, InMemoryOrderStore};
pub use scylladb::{ScyllaCatalog, ScyllaOrderSequence, ScyllaOrderStore};

/// Result of a version-guarded update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(Order),
    NotFound,
    /// The stored version no longer matches the one the caller loaded.
    Conflict { current_version: i64 },
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order. Fails if the id or order number already exists.
    async fn create(&self, order: &Order) -> anyhow::Result<()>;

    async fn find_by_id(&self, id: OrderId) -> anyhow::Result<Option<Order>>;

    async fn find_one(&self, filter: &OrderFilter) -> anyhow::Result<Option<Order>>;

    /// Matching orders, newest first.
    async fn find_many(&self, filter: &OrderFilter, page: Pagination) -> anyhow::Result<Vec<Order>>;

    /// Write `changes` only if the stored order is still at `expected_version`.
    async fn update_by_id(
        &self,
        id: OrderId,
        expected_version: i64,
        changes: &OrderChanges,
    ) -> anyhow::Result<UpdateOutcome>;

    async fn count(&self, filter: &OrderFilter) -> anyhow::Result<u64>;
}

/// Atomic per-day counter backing order numbers.
#[async_trait]
pub trait OrderSequence: Send + Sync {
    /// Next value for `day`, starting at 1. Never hands out the same value
    /// twice for the same day.
    async fn next_value(&self, day: NaiveDate) -> anyhow::Result<u32>;
}

// ============================================================================
// Filters & Pagination
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub owner_id: Option<AccountId>,
    pub order_number: Option<OrderNumber>,
    pub status: Option<OrderStatus>,
    /// Inclusive lower bound on `created_at`.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
    pub min_total: Option<Decimal>,
    pub max_total: Option<Decimal>,
}

impl OrderFilter {
    pub fn by_owner(owner_id: AccountId) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::default()
        }
    }

    pub fn by_number(order_number: OrderNumber) -> Self {
        Self {
            order_number: Some(order_number),
            ..Self::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.owner_id.is_none_or(|owner| order.owner_id == owner)
            && self
                .order_number
                .as_ref()
                .is_none_or(|number| &order.order_number == number)
            && self.status.is_none_or(|status| order.status == status)
            && self.created_from.is_none_or(|from| order.created_at >= from)
            && self.created_before.is_none_or(|before| order.created_at < before)
            && self.min_total.is_none_or(|min| order.total >= min)
            && self.max_total.is_none_or(|max| order.total <= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page index.
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: page.max(1),
            limit,
        }
    }

    /// Rows to skip. Saturates for pages far past the end.
    pub fn offset(&self) -> usize {
        let skipped = self.page.saturating_sub(1).saturating_mul(self.limit);
        usize::try_from(skipped).unwrap_or(usize::MAX)
    }

    pub fn apply(&self, mut orders: Vec<Order>) -> Vec<Order> {
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
            .into_iter()
            .skip(self.offset())
            .take(usize::try_from(self.limit).unwrap_or(usize::MAX))
            .collect()
    }
}
