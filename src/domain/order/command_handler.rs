use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::aggregate::{Order, OrderChanges, OrderDraft};
use super::commands::{OrderCommand, PaymentUpdate, PlaceOrder, StatusUpdate};
use super::errors::{CancelRefusal, OrderError};
use super::events::{OrderEvent, OrderStockRestored, StockMovement};
use super::numbering::OrderNumberAllocator;
use super::placement::{self, StockReservation};
use super::value_objects::{OrderId, OrderStatus, PaymentMethod, PaymentStatus, Requester};
use crate::config::OrderSettings;
use crate::domain::catalog::Catalog;
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::store::{OrderSequence, OrderStore, UpdateOutcome};
use crate::utils::Clock;

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: load -> decide events -> apply -> version-guarded write ->
// side effects (stock restoration, metrics, notifications).
//
// Side effects only run after the write is committed, so a command that
// loses a version race changes nothing.
//
// ============================================================================

/// Bound on version-guarded writes of the owed stock list.
const MAX_RESTOCK_WRITES: usize = 8;

pub struct OrderCommandHandler {
    store: Arc<dyn OrderStore>,
    catalog: Arc<dyn Catalog>,
    numbers: OrderNumberAllocator,
    publisher: Arc<EventPublisher>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    settings: OrderSettings,
}

impl OrderCommandHandler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        catalog: Arc<dyn Catalog>,
        sequence: Arc<dyn OrderSequence>,
        publisher: Arc<EventPublisher>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
        settings: OrderSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            numbers: OrderNumberAllocator::new(sequence),
            publisher,
            clock,
            metrics,
            settings,
        }
    }

    /// Price, reserve stock for and persist a new order.
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.try_place_order(request).await;
        self.finish("place_order", started, &result);
        result
    }

    /// Administrative status change, optionally with tracking number and note.
    pub async fn update_status(
        &self,
        requester: Requester,
        order_id: OrderId,
        update: StatusUpdate,
    ) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.try_update_status(requester, order_id, update).await;
        self.finish("update_status", started, &result);
        result
    }

    /// Record a payment outcome reported for an order.
    pub async fn update_payment(
        &self,
        requester: Requester,
        order_id: OrderId,
        update: PaymentUpdate,
    ) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.try_update_payment(requester, order_id, update).await;
        self.finish("update_payment", started, &result);
        result
    }

    /// Cancel a pending or processing order and return its stock.
    pub async fn cancel_order(&self, requester: Requester, order_id: OrderId) -> Result<Order, OrderError> {
        let started = Instant::now();
        let result = self.try_cancel_order(requester, order_id).await;
        self.finish("cancel_order", started, &result);
        result
    }

    async fn try_place_order(&self, request: PlaceOrder) -> Result<Order, OrderError> {
        let draft = placement::price_order(
            self.catalog.as_ref(),
            &request,
            self.settings.price_tolerance(),
        )
        .await?;

        let reservation = match StockReservation::reserve(self.catalog.clone(), &draft.items).await {
            Ok(reservation) => reservation,
            Err(e) => {
                self.metrics.record_rollback();
                return Err(e);
            }
        };

        let now = self.clock.now();
        let order = match self.persist_new(draft, now).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(error = %e, owner_id = %request.owner_id, "Order not persisted, releasing stock");
                reservation.release().await;
                self.metrics.record_rollback();
                return Err(OrderError::Backend(e));
            }
        };

        let units = reservation.commit();
        self.metrics.record_placed(units);

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            owner_id = %order.owner_id,
            total = %order.total,
            lines = order.items.len(),
            "Order placed"
        );

        self.publisher
            .publish(&order, vec![order.placed_event()], Some(order.owner_id), now)
            .await;

        Ok(order)
    }

    async fn persist_new(&self, draft: OrderDraft, now: DateTime<Utc>) -> anyhow::Result<Order> {
        let order_number = self.numbers.allocate(now).await?;
        let order = Order::new(draft, order_number, now);
        self.store.create(&order).await?;
        Ok(order)
    }

    async fn try_update_status(
        &self,
        requester: Requester,
        order_id: OrderId,
        update: StatusUpdate,
    ) -> Result<Order, OrderError> {
        if !requester.is_admin() {
            return Err(OrderError::Forbidden(order_id));
        }

        let command = OrderCommand::UpdateStatus {
            status: update.status,
            tracking_number: update.tracking_number,
            admin_note: update.admin_note,
        };

        let (order, events, now) = self.execute(order_id, |_| Ok(command)).await?;
        self.after_commit(order, events, requester, now).await
    }

    async fn try_update_payment(
        &self,
        requester: Requester,
        order_id: OrderId,
        update: PaymentUpdate,
    ) -> Result<Order, OrderError> {
        let (order, events, now) = self
            .execute(order_id, |order| {
                if !requester.can_access(order.owner_id) {
                    return Err(OrderError::Forbidden(order.id));
                }

                let status: PaymentStatus = update.status.parse()?;
                let method: PaymentMethod = update.method.parse()?;

                Ok(OrderCommand::UpdatePayment {
                    method,
                    status,
                    reference: update.reference.clone(),
                    paid_at: update.paid_at,
                })
            })
            .await?;

        self.metrics.record_payment(order.payment_status.as_str());
        self.after_commit(order, events, requester, now).await
    }

    async fn try_cancel_order(&self, requester: Requester, order_id: OrderId) -> Result<Order, OrderError> {
        let current = self.load(order_id).await?;

        // A cancellation whose restock failed part way is finished by cancelling again.
        if current.status == OrderStatus::Cancelled && !current.pending_restock.is_empty() {
            if !requester.can_access(current.owner_id) {
                return Err(OrderError::OrderNotCancellable {
                    order_id,
                    reason: CancelRefusal::NotOwner,
                });
            }

            tracing::info!(
                order_id = %order_id,
                owed_lines = current.pending_restock.len(),
                "Resuming stock restoration for cancelled order"
            );

            let now = self.clock.now();
            let mut events = Vec::new();
            let settled = self.settle_restock(order_id, &mut events, now).await;
            let order = match &settled {
                Ok(Some(latest)) => latest.clone(),
                _ => current,
            };
            if !events.is_empty() {
                self.publisher
                    .publish(&order, events, Some(requester.account_id), now)
                    .await;
            }

            return match settled? {
                Some(_) => Ok(order),
                None => Err(OrderError::OrderNotCancellable {
                    order_id,
                    reason: CancelRefusal::Status(OrderStatus::Cancelled),
                }),
            };
        }

        let (order, events, now) = self
            .execute(order_id, |_| Ok(OrderCommand::Cancel { requested_by: requester }))
            .await?;

        self.after_commit(order, events, requester, now).await
    }

    async fn load(&self, order_id: OrderId) -> Result<Order, OrderError> {
        self.store
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| OrderError::OrderNotFound(order_id.to_string()))
    }

    /// Load the order, build the command against it, decide and commit.
    async fn execute<F>(
        &self,
        order_id: OrderId,
        build: F,
    ) -> Result<(Order, Vec<OrderEvent>, DateTime<Utc>), OrderError>
    where
        F: FnOnce(&Order) -> Result<OrderCommand, OrderError>,
    {
        let current = self.load(order_id).await?;

        let command = build(&current)?;
        let now = self.clock.now();
        let events = current.handle_command(&command, now)?;

        if events.is_empty() {
            tracing::debug!(order_id = %order_id, "Command produced no changes");
            return Ok((current, events, now));
        }

        let mut updated = current.clone();
        updated.apply_events(&events, now);
        let changes = OrderChanges::between(&current, &updated);

        match self
            .store
            .update_by_id(order_id, current.version, &changes)
            .await?
        {
            UpdateOutcome::Updated(order) => Ok((order, events, now)),
            UpdateOutcome::NotFound => Err(OrderError::OrderNotFound(order_id.to_string())),
            UpdateOutcome::Conflict { current_version } => {
                tracing::warn!(
                    order_id = %order_id,
                    expected_version = current.version,
                    current_version,
                    "Order changed since it was loaded"
                );
                Err(OrderError::ConcurrentModification(order_id))
            }
        }
    }

    /// Side effects of a committed change: stock comes back when the order
    /// has just become cancelled, then metrics and notifications.
    async fn after_commit(
        &self,
        order: Order,
        mut events: Vec<OrderEvent>,
        requester: Requester,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        for event in &events {
            if let OrderEvent::StatusChanged(change) = event {
                self.metrics
                    .record_transition(change.from.as_str(), change.to.as_str());
                tracing::info!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    from = %change.from,
                    to = %change.to,
                    "Order status changed"
                );
            }
        }

        let just_cancelled = events.iter().any(|event| {
            matches!(event, OrderEvent::StatusChanged(change)
                if change.to == OrderStatus::Cancelled && change.from != OrderStatus::Cancelled)
        });

        let settled = if just_cancelled {
            self.metrics.record_cancellation();
            self.settle_restock(order.id, &mut events, now).await
        } else {
            Ok(None)
        };

        let order = match &settled {
            Ok(Some(latest)) => latest.clone(),
            _ => order,
        };

        if !events.is_empty() {
            self.publisher
                .publish(&order, events, Some(requester.account_id), now)
                .await;
        }

        settled.map(|_| order)
    }

    /// Give a cancelled order's owed stock back to the catalog.
    ///
    /// The owed lines are first claimed with a version-guarded write that
    /// clears them, so two callers never restore the same line. Lines the
    /// catalog fails to take back are written back onto the order for the
    /// next attempt. Returns the order after the claim, or `None` when
    /// nothing was owed any more.
    async fn settle_restock(
        &self,
        order_id: OrderId,
        events: &mut Vec<OrderEvent>,
        now: DateTime<Utc>,
    ) -> Result<Option<Order>, OrderError> {
        let Some((order, owed)) = self.claim_restock(order_id, now).await? else {
            return Ok(None);
        };

        let restock = placement::restore_stock(self.catalog.as_ref(), &owed).await;
        let deferred: u64 = restock.unsettled.iter().map(|m| u64::from(m.quantity)).sum();
        self.metrics.record_restock(restock.units(), deferred);

        if !restock.restored.is_empty() {
            tracing::info!(
                order_id = %order_id,
                restored_units = restock.units(),
                "Stock restored for cancelled order"
            );
            events.push(OrderEvent::StockRestored(OrderStockRestored {
                lines: restock.restored,
            }));
        }

        let Some(failure) = restock.failure else {
            return Ok(Some(order));
        };

        self.requeue_restock(order_id, &restock.unsettled, now).await;
        Err(OrderError::Backend(failure.context(format!(
            "stock for order {order_id} only partly restored, cancel again to resume"
        ))))
    }

    /// Take over every owed line of an order, retrying when another write
    /// moved its version in between.
    async fn claim_restock(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<(Order, Vec<StockMovement>)>, OrderError> {
        for _ in 0..MAX_RESTOCK_WRITES {
            let current = self.load(order_id).await?;
            if current.pending_restock.is_empty() {
                return Ok(None);
            }

            let owed = current.pending_restock.clone();
            match self
                .store
                .update_by_id(order_id, current.version, &OrderChanges::restock(Vec::new(), now))
                .await?
            {
                UpdateOutcome::Updated(order) => return Ok(Some((order, owed))),
                UpdateOutcome::NotFound => return Err(OrderError::OrderNotFound(order_id.to_string())),
                UpdateOutcome::Conflict { .. } => continue,
            }
        }

        Err(OrderError::ConcurrentModification(order_id))
    }

    /// Put lines the catalog did not take back onto the order again.
    async fn requeue_restock(&self, order_id: OrderId, unsettled: &[StockMovement], now: DateTime<Utc>) {
        for _ in 0..MAX_RESTOCK_WRITES {
            let current = match self.load(order_id).await {
                Ok(current) => current,
                Err(e) => {
                    tracing::error!(order_id = %order_id, error = %e, lines = ?unsettled, "Owed stock could not be recorded");
                    return;
                }
            };

            let mut owed = current.pending_restock.clone();
            owed.extend_from_slice(unsettled);

            match self
                .store
                .update_by_id(order_id, current.version, &OrderChanges::restock(owed, now))
                .await
            {
                Ok(UpdateOutcome::Updated(_)) => {
                    tracing::warn!(order_id = %order_id, lines = unsettled.len(), "Owed stock recorded for a later restock");
                    return;
                }
                Ok(UpdateOutcome::Conflict { .. }) => continue,
                Ok(UpdateOutcome::NotFound) => break,
                Err(e) => {
                    tracing::error!(order_id = %order_id, error = %e, lines = ?unsettled, "Owed stock could not be recorded");
                    return;
                }
            }
        }

        tracing::error!(order_id = %order_id, lines = ?unsettled, "Owed stock could not be recorded");
    }

    fn finish<T>(&self, operation: &str, started: Instant, result: &Result<T, OrderError>) {
        self.metrics
            .observe_operation(operation, started.elapsed().as_secs_f64());

        if let Err(e) = result {
            self.metrics.record_rejection(operation, e.kind());
            match e {
                OrderError::Backend(_) => {
                    tracing::error!(operation, error = %e, "Order operation failed");
                }
                _ => tracing::warn!(operation, reason = e.kind(), error = %e, "Order operation rejected"),
            }
        }
    }
}
