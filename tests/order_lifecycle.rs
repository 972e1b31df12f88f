use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use olive_orders::config::OrderSettings;
use olive_orders::domain::catalog::Product;
use olive_orders::domain::order::{
    CancelRefusal, Order, OrderChanges, OrderCommandHandler, OrderError, OrderId, OrderQueries,
    OrderStatus, PaymentStatus, PaymentUpdate, PlaceOrder, RequestedLine, Requester,
    ShippingAddress, StatusUpdate, Unavailability,
};
use olive_orders::messaging::{EventPublisher, MemorySink};
use olive_orders::metrics::Metrics;
use olive_orders::store::{
    InMemoryCatalog, InMemoryOrderSequence, InMemoryOrderStore, OrderFilter, OrderStore,
    Pagination, UpdateOutcome,
};
use olive_orders::utils::{CircuitBreakerConfig, FixedClock, RetryPolicy};

// ============================================================================
// Harness
// ============================================================================

fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 14, 9, 0, 0).unwrap()
}

struct Shop {
    handler: Arc<OrderCommandHandler>,
    queries: OrderQueries,
    catalog: Arc<InMemoryCatalog>,
    sink: Arc<MemorySink>,
    clock: Arc<FixedClock>,
}

impl Shop {
    fn with_store(store: Arc<dyn OrderStore>) -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let sink = Arc::new(MemorySink::new());
        let clock = Arc::new(FixedClock::new(morning()));
        let metrics = Arc::new(Metrics::new().unwrap());

        let publisher = Arc::new(EventPublisher::new(
            sink.clone(),
            RetryPolicy::none(),
            CircuitBreakerConfig::default(),
            metrics.clone(),
        ));

        let handler = OrderCommandHandler::new(
            store.clone(),
            catalog.clone(),
            Arc::new(InMemoryOrderSequence::new()),
            publisher,
            clock.clone(),
            metrics,
            OrderSettings::default(),
        );

        Self {
            handler: Arc::new(handler),
            queries: OrderQueries::new(store, OrderSettings::default()),
            catalog,
            sink,
            clock,
        }
    }

    fn new() -> Self {
        Self::with_store(Arc::new(InMemoryOrderStore::new()))
    }

    async fn stock(&self, product: &Product) -> u32 {
        self.catalog.stock_of(product.id).await.unwrap()
    }
}

fn oil(name: &str, price: Decimal, stock: u32) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        price,
        discounted_price: None,
        is_active: true,
        stock,
        images: vec![],
    }
}

fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Lucía Ferrer".to_string(),
        email: "lucia@example.com".to_string(),
        phone: "+34 600 000 000".to_string(),
        address_line1: "Calle del Olivo 12".to_string(),
        address_line2: None,
        city: "Jaén".to_string(),
        region: None,
        postal_code: "23001".to_string(),
        country: "ES".to_string(),
    }
}

fn checkout(owner: Requester, lines: &[(&Product, u32, Decimal)]) -> PlaceOrder {
    PlaceOrder {
        owner_id: owner.account_id,
        lines: lines
            .iter()
            .map(|(product, quantity, unit_price)| RequestedLine {
                product_id: product.id,
                quantity: *quantity,
                unit_price: *unit_price,
            })
            .collect(),
        shipping_address: address(),
        payment_method: "card".to_string(),
        notes: None,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn scenario_a_order_created_and_stock_taken() {
    let shop = Shop::new();
    let picual = oil("Picual 1L", dec!(50.00), 5);
    shop.catalog.insert(picual.clone()).await;
    let customer = Requester::customer(Uuid::new_v4());

    let order = shop
        .handler
        .place_order(checkout(customer, &[(&picual, 2, dec!(50.00))]))
        .await
        .unwrap();

    assert_eq!(order.total, dec!(100.00));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.items[0].price, dec!(50.00));
    assert_eq!(shop.stock(&picual).await, 3);
}

#[tokio::test]
async fn scenario_b_price_mismatch_rejected() {
    let shop = Shop::new();
    let picual = oil("Picual 1L", dec!(50.00), 5);
    shop.catalog.insert(picual.clone()).await;
    let customer = Requester::customer(Uuid::new_v4());

    let result = shop
        .handler
        .place_order(checkout(customer, &[(&picual, 2, dec!(45.00))]))
        .await;

    assert!(matches!(
        result,
        Err(OrderError::PriceMismatch { expected, supplied, .. })
            if expected == dec!(50.00) && supplied == dec!(45.00)
    ));
    assert_eq!(shop.stock(&picual).await, 5);
}

#[tokio::test]
async fn scenario_c_cancel_restores_stock_once() {
    let shop = Shop::new();
    let picual = oil("Picual 1L", dec!(50.00), 5);
    shop.catalog.insert(picual.clone()).await;
    let customer = Requester::customer(Uuid::new_v4());

    let order = shop
        .handler
        .place_order(checkout(customer, &[(&picual, 2, dec!(50.00))]))
        .await
        .unwrap();
    assert_eq!(shop.stock(&picual).await, 3);

    let later = Utc.with_ymd_and_hms(2026, 5, 14, 10, 0, 0).unwrap();
    shop.clock.set(later);
    let cancelled = shop.handler.cancel_order(customer, order.id).await.unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancelled_at, Some(later));
    assert_eq!(shop.stock(&picual).await, 5);

    let again = shop.handler.cancel_order(customer, order.id).await;
    assert!(matches!(
        again,
        Err(OrderError::OrderNotCancellable {
            reason: CancelRefusal::Status(OrderStatus::Cancelled),
            ..
        })
    ));
    assert_eq!(shop.stock(&picual).await, 5);
    assert!(shop
        .sink
        .event_types()
        .await
        .contains(&"OrderStockRestored".to_string()));
}

#[tokio::test]
async fn scenario_d_shipped_cannot_go_back_to_processing() {
    let shop = Shop::new();
    let picual = oil("Picual 1L", dec!(50.00), 5);
    shop.catalog.insert(picual.clone()).await;
    let customer = Requester::customer(Uuid::new_v4());
    let admin = Requester::admin(Uuid::new_v4());

    let order = shop
        .handler
        .place_order(checkout(customer, &[(&picual, 1, dec!(50.00))]))
        .await
        .unwrap();
    for status in [OrderStatus::Processing, OrderStatus::Shipped] {
        shop.handler
            .update_status(admin, order.id, StatusUpdate::to(status))
            .await
            .unwrap();
    }

    let result = shop
        .handler
        .update_status(admin, order.id, StatusUpdate::to(OrderStatus::Processing))
        .await;

    assert!(matches!(
        result,
        Err(OrderError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Processing,
        })
    ));
}

#[tokio::test]
async fn scenario_e_payment_moves_pending_to_processing() {
    let shop = Shop::new();
    let picual = oil("Picual 1L", dec!(50.00), 5);
    shop.catalog.insert(picual.clone()).await;
    let customer = Requester::customer(Uuid::new_v4());

    let order = shop
        .handler
        .place_order(checkout(customer, &[(&picual, 1, dec!(50.00))]))
        .await
        .unwrap();

    let paid = shop
        .handler
        .update_payment(customer, order.id, PaymentUpdate::new("card", "paid"))
        .await
        .unwrap();

    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.status, OrderStatus::Processing);
    assert_eq!(paid.processing_at, Some(morning()));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checkouts_never_oversell() {
    let shop = Shop::new();
    let reserve = oil("Reserva Familiar", dec!(80.00), 5);
    shop.catalog.insert(reserve.clone()).await;

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let handler = shop.handler.clone();
            let request = checkout(Requester::customer(Uuid::new_v4()), &[(&reserve, 1, dec!(80.00))]);
            tokio::spawn(async move { handler.place_order(request).await })
        })
        .collect();

    let mut placed = Vec::new();
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => placed.push(order.order_number),
            Err(OrderError::ProductUnavailable {
                reason: Unavailability::InsufficientStock { .. },
                ..
            }) => refused += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(placed.len(), 5);
    assert_eq!(refused, 7);
    assert_eq!(shop.stock(&reserve).await, 0);

    placed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    placed.dedup();
    assert_eq!(placed.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_cancels_restore_stock_once() {
    let shop = Shop::new();
    let picual = oil("Picual 1L", dec!(50.00), 10);
    shop.catalog.insert(picual.clone()).await;
    let customer = Requester::customer(Uuid::new_v4());
    let admin = Requester::admin(Uuid::new_v4());

    let order = shop
        .handler
        .place_order(checkout(customer, &[(&picual, 4, dec!(50.00))]))
        .await
        .unwrap();

    let handles: Vec<_> = [customer, admin, customer, admin]
        .into_iter()
        .map(|requester| {
            let handler = shop.handler.clone();
            tokio::spawn(async move { handler.cancel_order(requester, order.id).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(OrderError::ConcurrentModification(_)) | Err(OrderError::OrderNotCancellable { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // A caller arriving between the cancel and its restock may finish the
    // restock itself, so more than one can succeed. Stock comes back once.
    assert!(succeeded >= 1);
    assert_eq!(shop.stock(&picual).await, 10);
    let restocks = shop
        .sink
        .event_types()
        .await
        .into_iter()
        .filter(|t| t == "OrderStockRestored")
        .count();
    assert_eq!(restocks, 1);
}

/// Store that lets another writer bump the version between a load and the
/// conditional write, once.
struct InterleavingStore {
    inner: InMemoryOrderStore,
    interfere: AtomicBool,
}

#[async_trait]
impl OrderStore for InterleavingStore {
    async fn create(&self, order: &Order) -> anyhow::Result<()> {
        self.inner.create(order).await
    }

    async fn find_by_id(&self, id: OrderId) -> anyhow::Result<Option<Order>> {
        self.inner.find_by_id(id).await
    }

    async fn find_one(&self, filter: &OrderFilter) -> anyhow::Result<Option<Order>> {
        self.inner.find_one(filter).await
    }

    async fn find_many(&self, filter: &OrderFilter, page: Pagination) -> anyhow::Result<Vec<Order>> {
        self.inner.find_many(filter, page).await
    }

    async fn update_by_id(
        &self,
        id: OrderId,
        expected_version: i64,
        changes: &OrderChanges,
    ) -> anyhow::Result<UpdateOutcome> {
        if self.interfere.swap(false, Ordering::SeqCst) {
            self.inner
                .update_by_id(id, expected_version, &OrderChanges::default())
                .await?;
        }
        self.inner.update_by_id(id, expected_version, changes).await
    }

    async fn count(&self, filter: &OrderFilter) -> anyhow::Result<u64> {
        self.inner.count(filter).await
    }
}

#[tokio::test]
async fn stale_write_is_reported_not_applied() {
    let store = Arc::new(InterleavingStore {
        inner: InMemoryOrderStore::new(),
        interfere: AtomicBool::new(false),
    });
    let shop = Shop::with_store(store.clone());
    let picual = oil("Picual 1L", dec!(50.00), 5);
    shop.catalog.insert(picual.clone()).await;
    let customer = Requester::customer(Uuid::new_v4());

    let order = shop
        .handler
        .place_order(checkout(customer, &[(&picual, 2, dec!(50.00))]))
        .await
        .unwrap();

    store.interfere.store(true, Ordering::SeqCst);
    let result = shop.handler.cancel_order(customer, order.id).await;

    assert!(matches!(result, Err(OrderError::ConcurrentModification(id)) if id == order.id));
    let stored = store.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(shop.stock(&picual).await, 3);
}

// ============================================================================
// Rollback, access and payment edge cases
// ============================================================================

#[tokio::test]
async fn inactive_line_rejects_whole_order() {
    let shop = Shop::new();
    let picual = oil("Picual 1L", dec!(50.00), 5);
    let arbequina = oil("Arbequina 500ml", dec!(14.00), 5);
    shop.catalog.insert(picual.clone()).await;
    shop.catalog.insert(arbequina.clone()).await;
    shop.catalog.set_active(arbequina.id, false).await;
    let customer = Requester::customer(Uuid::new_v4());

    let result = shop
        .handler
        .place_order(checkout(
            customer,
            &[(&picual, 1, dec!(50.00)), (&arbequina, 1, dec!(14.00))],
        ))
        .await;

    assert!(matches!(
        result,
        Err(OrderError::ProductUnavailable { reason: Unavailability::Inactive, .. })
    ));
    assert_eq!(shop.stock(&picual).await, 5);
}

#[tokio::test]
async fn strangers_cannot_read_or_cancel() {
    let shop = Shop::new();
    let picual = oil("Picual 1L", dec!(50.00), 5);
    shop.catalog.insert(picual.clone()).await;
    let customer = Requester::customer(Uuid::new_v4());
    let stranger = Requester::customer(Uuid::new_v4());

    let order = shop
        .handler
        .place_order(checkout(customer, &[(&picual, 1, dec!(50.00))]))
        .await
        .unwrap();

    assert!(matches!(
        shop.queries.get_order(stranger, order.id).await,
        Err(OrderError::Forbidden(_))
    ));
    assert!(matches!(
        shop.handler.cancel_order(stranger, order.id).await,
        Err(OrderError::OrderNotCancellable {
            reason: CancelRefusal::NotOwner,
            ..
        })
    ));
    assert_eq!(shop.stock(&picual).await, 4);
}

#[tokio::test]
async fn refund_after_shipping_keeps_status_and_stock() {
    let shop = Shop::new();
    let picual = oil("Picual 1L", dec!(50.00), 5);
    shop.catalog.insert(picual.clone()).await;
    let customer = Requester::customer(Uuid::new_v4());
    let admin = Requester::admin(Uuid::new_v4());

    let order = shop
        .handler
        .place_order(checkout(customer, &[(&picual, 2, dec!(50.00))]))
        .await
        .unwrap();
    shop.handler
        .update_payment(customer, order.id, PaymentUpdate::new("card", "paid"))
        .await
        .unwrap();
    shop.handler
        .update_status(
            admin,
            order.id,
            StatusUpdate::to(OrderStatus::Shipped).with_tracking_number("SEUR-1"),
        )
        .await
        .unwrap();

    let refunded = shop
        .handler
        .update_payment(admin, order.id, PaymentUpdate::new("card", "refunded"))
        .await
        .unwrap();

    assert_eq!(refunded.status, OrderStatus::Shipped);
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    assert_eq!(refunded.admin_notes.len(), 1);
    assert_eq!(shop.stock(&picual).await, 3);

    let view = shop.queries.track_order(order.order_number.as_str()).await.unwrap();
    assert_eq!(view.tracking_number, "SEUR-1");
    assert_eq!(view.history.len(), 3);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn placing_then_cancelling_restores_every_stock_level(
        lines in proptest::collection::vec((1u32..6, 1i64..10_000), 1..5)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

        runtime.block_on(async {
            let shop = Shop::new();
            let customer = Requester::customer(Uuid::new_v4());

            let mut products = Vec::new();
            for (i, (quantity, cents)) in lines.iter().enumerate() {
                let product = oil(&format!("oil-{i}"), Decimal::new(*cents, 2), 10);
                shop.catalog.insert(product.clone()).await;
                products.push((product, *quantity));
            }

            let request_lines: Vec<_> = products
                .iter()
                .map(|(product, quantity)| (product, *quantity, product.price))
                .collect();
            let order = shop
                .handler
                .place_order(checkout(customer, &request_lines))
                .await
                .unwrap();

            let expected_total: Decimal = products
                .iter()
                .map(|(product, quantity)| product.price * Decimal::from(*quantity))
                .sum();
            assert_eq!(order.total, expected_total);

            for (product, quantity) in &products {
                assert_eq!(shop.stock(product).await, 10 - quantity);
            }

            shop.handler.cancel_order(customer, order.id).await.unwrap();

            for (product, _) in &products {
                assert_eq!(shop.stock(product).await, 10);
            }
        });
    }
}
