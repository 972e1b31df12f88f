use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use scylla::client::session::Session;
use scylla::response::PagingState;
use scylla::serialize::row::SerializeRow;
use scylla::statement::Statement;
use uuid::Uuid;

use super::execute_conditional;
use crate::domain::order::{Order, OrderChanges, OrderId};
use crate::store::{OrderFilter, OrderStore, Pagination, UpdateOutcome};

/// Rows fetched per round trip when listing orders.
const PAGE_SIZE: i32 = 500;

pub struct ScyllaOrderStore {
    session: Arc<Session>,
}

impl ScyllaOrderStore {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn write_document(&self, order: &Order, expected_version: i64) -> Result<bool> {
        let document = serde_json::to_string(order)?;

        execute_conditional(
            &self.session,
            "UPDATE orders SET status = ?, version = ?, document = ? WHERE id = ? IF version = ?",
            (order.status.as_str(), order.version, document, order.id, expected_version),
        )
        .await
    }

    async fn id_for_number(&self, order_number: &str) -> Result<Option<OrderId>> {
        let row = self
            .session
            .query_unpaged(
                "SELECT order_id FROM orders_by_number WHERE order_number = ?",
                (order_number,),
            )
            .await?
            .into_rows_result()?
            .maybe_first_row::<(Uuid,)>()?;

        Ok(row.map(|(id,)| id))
    }

    /// Orders matching `filter`. Owner-scoped filters read through the
    /// owner index; anything else walks the table page by page.
    async fn scan(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        match filter.owner_id {
            Some(owner_id) => {
                self.collect_pages("SELECT document FROM orders WHERE owner_id = ?", (owner_id,), filter)
                    .await
            }
            None => self.collect_pages("SELECT document FROM orders", (), filter).await,
        }
    }

    async fn collect_pages<V>(&self, cql: &str, values: V, filter: &OrderFilter) -> Result<Vec<Order>>
    where
        V: SerializeRow + Clone,
    {
        let statement = Statement::new(cql).with_page_size(PAGE_SIZE);
        let mut paging_state = PagingState::start();
        let mut orders = Vec::new();

        loop {
            let (result, paging_response) = self
                .session
                .query_single_page(statement.clone(), values.clone(), paging_state)
                .await?;

            for row in result.into_rows_result()?.rows::<(String,)>()? {
                let (document,) = row?;
                let order: Order = serde_json::from_str(&document).context("corrupt order document")?;
                if filter.matches(&order) {
                    orders.push(order);
                }
            }

            match paging_response.into_paging_control_flow() {
                ControlFlow::Break(()) => break,
                ControlFlow::Continue(next) => paging_state = next,
            }
        }

        Ok(orders)
    }

    async fn insert_document(&self, order: &Order) -> Result<bool> {
        let document = serde_json::to_string(order)?;

        execute_conditional(
            &self.session,
            "INSERT INTO orders (id, order_number, owner_id, status, created_at, version, document) \
             VALUES (?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            (
                order.id,
                order.order_number.as_str(),
                order.owner_id,
                order.status.as_str(),
                order.created_at,
                order.version,
                document,
            ),
        )
        .await
    }

    async fn release_number(&self, order: &Order) {
        let released = self
            .session
            .query_unpaged(
                "DELETE FROM orders_by_number WHERE order_number = ?",
                (order.order_number.as_str(),),
            )
            .await;

        if let Err(e) = released {
            tracing::warn!(order_number = %order.order_number, error = %e, "Order number claim not released");
        }
    }
}

#[async_trait]
impl OrderStore for ScyllaOrderStore {
    async fn create(&self, order: &Order) -> Result<()> {
        let claimed = execute_conditional(
            &self.session,
            "INSERT INTO orders_by_number (order_number, order_id) VALUES (?, ?) IF NOT EXISTS",
            (order.order_number.as_str(), order.id),
        )
        .await?;

        if !claimed {
            bail!("Order number already allocated: {}", order.order_number);
        }

        let inserted = self.insert_document(order).await;
        if !matches!(inserted, Ok(true)) {
            self.release_number(order).await;
        }
        if !inserted? {
            bail!("Order already exists: {}", order.id);
        }

        tracing::debug!(order_id = %order.id, order_number = %order.order_number, "Order document written");
        Ok(())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        let row = self
            .session
            .query_unpaged("SELECT document FROM orders WHERE id = ?", (id,))
            .await?
            .into_rows_result()?
            .maybe_first_row::<(String,)>()?;

        row.map(|(document,)| serde_json::from_str(&document).context("corrupt order document"))
            .transpose()
    }

    async fn find_one(&self, filter: &OrderFilter) -> Result<Option<Order>> {
        if let Some(number) = &filter.order_number {
            let Some(id) = self.id_for_number(number.as_str()).await? else {
                return Ok(None);
            };
            let order = self.find_by_id(id).await?;
            return Ok(order.filter(|order| filter.matches(order)));
        }

        Ok(self.scan(filter).await?.into_iter().next())
    }

    async fn find_many(&self, filter: &OrderFilter, page: Pagination) -> Result<Vec<Order>> {
        Ok(page.apply(self.scan(filter).await?))
    }

    async fn update_by_id(
        &self,
        id: OrderId,
        expected_version: i64,
        changes: &OrderChanges,
    ) -> Result<UpdateOutcome> {
        let Some(mut order) = self.find_by_id(id).await? else {
            return Ok(UpdateOutcome::NotFound);
        };

        if order.version != expected_version {
            return Ok(UpdateOutcome::Conflict {
                current_version: order.version,
            });
        }

        changes.apply_to(&mut order);

        if self.write_document(&order, expected_version).await? {
            return Ok(UpdateOutcome::Updated(order));
        }

        // Lost the race between our read and the conditional write.
        match self.find_by_id(id).await? {
            Some(current) => Ok(UpdateOutcome::Conflict {
                current_version: current.version,
            }),
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn count(&self, filter: &OrderFilter) -> Result<u64> {
        Ok(self.scan(filter).await?.len() as u64)
    }
}
