use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregate::Order;
use super::errors::OrderError;
use super::tracking::{self, TrackingView};
use super::value_objects::{AccountId, OrderId, OrderNumber, OrderStatus, Requester};
use crate::config::OrderSettings;
use crate::store::{OrderFilter, OrderStore, Pagination};

/// Listing criteria. `owner_id` is honoured for administrators only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQuery {
    pub owner_id: Option<AccountId>,
    pub status: Option<OrderStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub min_total: Option<Decimal>,
    pub max_total: Option<Decimal>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub pages: u64,
}

/// Read side of the order engine.
pub struct OrderQueries {
    store: Arc<dyn OrderStore>,
    settings: OrderSettings,
}

impl OrderQueries {
    pub fn new(store: Arc<dyn OrderStore>, settings: OrderSettings) -> Self {
        Self { store, settings }
    }

    pub async fn get_order(&self, requester: Requester, order_id: OrderId) -> Result<Order, OrderError> {
        let order = self
            .store
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))?;

        if !requester.can_access(order.owner_id) {
            return Err(OrderError::Forbidden(order_id));
        }

        Ok(order)
    }

    pub async fn list_orders(&self, requester: Requester, query: OrderQuery) -> Result<OrderPage, OrderError> {
        let owner_id = if requester.is_admin() {
            query.owner_id
        } else {
            Some(requester.account_id)
        };

        let filter = OrderFilter {
            owner_id,
            order_number: None,
            status: query.status,
            created_from: query.created_from,
            created_before: query.created_before,
            min_total: query.min_total,
            max_total: query.max_total,
        };

        let limit = query
            .limit
            .unwrap_or(self.settings.default_page_size)
            .clamp(1, self.settings.max_page_size.max(1));
        let pagination = Pagination::new(query.page.unwrap_or(1), limit);

        let total = self.store.count(&filter).await?;
        let orders = self.store.find_many(&filter, pagination).await?;

        tracing::debug!(
            requester = %requester.account_id,
            total,
            page = pagination.page,
            returned = orders.len(),
            "Listed orders"
        );

        Ok(OrderPage {
            orders,
            total,
            page: pagination.page,
            limit,
            pages: total.div_ceil(limit),
        })
    }

    /// Public lookup by order number; exposes no owner or street details.
    pub async fn track_order(&self, order_number: &str) -> Result<TrackingView, OrderError> {
        let number = OrderNumber::new(order_number.trim());

        let order = self
            .store
            .find_one(&OrderFilter::by_number(number))
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_number.to_string()))?;

        Ok(tracking::project(&order))
    }
}
