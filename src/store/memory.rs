use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, RwLock};

use super::{OrderFilter, OrderSequence, OrderStore, Pagination, UpdateOutcome};
use crate::domain::catalog::{Catalog, CatalogError, Product};
use crate::domain::order::{Order, OrderChanges, OrderId, ProductId};

// ============================================================================
// In-Memory Order Store
// ============================================================================

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;

        if orders.contains_key(&order.id) {
            bail!("Order already exists: {}", order.id);
        }
        if orders.values().any(|o| o.order_number == order.order_number) {
            bail!("Order number already allocated: {}", order.order_number);
        }

        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_one(&self, filter: &OrderFilter) -> Result<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|order| filter.matches(order))
            .cloned())
    }

    async fn find_many(&self, filter: &OrderFilter, page: Pagination) -> Result<Vec<Order>> {
        let matching: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();

        Ok(page.apply(matching))
    }

    async fn update_by_id(
        &self,
        id: OrderId,
        expected_version: i64,
        changes: &OrderChanges,
    ) -> Result<UpdateOutcome> {
        let mut orders = self.orders.write().await;

        let Some(order) = orders.get_mut(&id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if order.version != expected_version {
            return Ok(UpdateOutcome::Conflict {
                current_version: order.version,
            });
        }

        changes.apply_to(order);
        Ok(UpdateOutcome::Updated(order.clone()))
    }

    async fn count(&self, filter: &OrderFilter) -> Result<u64> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .filter(|order| filter.matches(order))
            .count() as u64)
    }
}

// ============================================================================
// In-Memory Catalog
// ============================================================================

#[derive(Default)]
pub struct InMemoryCatalog {
    products: Mutex<HashMap<ProductId, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: Product) {
        self.products.lock().await.insert(product.id, product);
    }

    pub async fn stock_of(&self, product_id: ProductId) -> Option<u32> {
        self.products.lock().await.get(&product_id).map(|p| p.stock)
    }

    pub async fn set_active(&self, product_id: ProductId, is_active: bool) {
        if let Some(product) = self.products.lock().await.get_mut(&product_id) {
            product.is_active = is_active;
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.lock().await.get(&product_id).cloned())
    }

    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<u32, CatalogError> {
        let mut products = self.products.lock().await;
        let product = products.get_mut(&product_id).ok_or(CatalogError::NotFound)?;

        let next = i64::from(product.stock) + delta;
        if next < 0 {
            return Err(CatalogError::InsufficientStock {
                available: product.stock,
            });
        }

        product.stock = u32::try_from(next)
            .map_err(|_| CatalogError::Backend(anyhow::anyhow!("stock overflow for {product_id}")))?;
        Ok(product.stock)
    }
}

// ============================================================================
// In-Memory Day Sequence
// ============================================================================

#[derive(Default)]
pub struct InMemoryOrderSequence {
    counters: Mutex<HashMap<NaiveDate, u32>>,
}

impl InMemoryOrderSequence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderSequence for InMemoryOrderSequence {
    async fn next_value(&self, day: NaiveDate) -> Result<u32> {
        let mut counters = self.counters.lock().await;
        let counter = counters.entry(day).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}
