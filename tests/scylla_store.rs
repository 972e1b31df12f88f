//! Runs against a live ScyllaDB node. Start one and run with
//! `cargo test --test scylla_store -- --ignored`. Nodes come from the usual
//! settings, e.g. `OLIVE__SCYLLA__KNOWN_NODES`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal_macros::dec;
use scylla::client::session::Session;
use uuid::Uuid;

use olive_orders::config::Settings;
use olive_orders::domain::catalog::{Catalog, CatalogError, Product};
use olive_orders::domain::order::{
    Order, OrderChanges, OrderDraft, OrderLine, OrderNumber, OrderStatus, PaymentMethod,
    ShippingAddress,
};
use olive_orders::store::{
    scylladb, OrderFilter, OrderSequence, OrderStore, Pagination, ScyllaCatalog,
    ScyllaOrderSequence, ScyllaOrderStore, UpdateOutcome,
};

async fn session() -> Arc<Session> {
    let mut settings = Settings::load().unwrap().scylla;
    settings.keyspace = "olive_orders_it".to_string();
    scylladb::connect(&settings).await.unwrap()
}

fn product(stock: u32) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: "Hojiblanca 750ml".to_string(),
        price: dec!(21.40),
        discounted_price: None,
        is_active: true,
        stock,
        images: vec![],
    }
}

fn order(owner_id: Uuid) -> Order {
    let draft = OrderDraft {
        owner_id,
        items: vec![OrderLine {
            product_id: Uuid::new_v4(),
            name: "Hojiblanca 750ml".to_string(),
            price: dec!(21.40),
            quantity: 2,
            image: None,
        }],
        shipping_address: ShippingAddress {
            full_name: "Pilar Gómez".to_string(),
            email: "pilar@example.com".to_string(),
            phone: "+34 611 000 000".to_string(),
            address_line1: "Plaza Mayor 3".to_string(),
            address_line2: None,
            city: "Baeza".to_string(),
            region: None,
            postal_code: "23440".to_string(),
            country: "ES".to_string(),
        },
        payment_method: PaymentMethod::Card,
        notes: None,
    };

    // Unique per run so reruns against the same keyspace never collide.
    let number = OrderNumber::new(format!("ORDIT{}", Uuid::new_v4().simple()));
    Order::new(draft, number, Utc::now())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs a running ScyllaDB node"]
async fn conditional_decrement_never_oversells() {
    let session = session().await;
    let catalog = Arc::new(ScyllaCatalog::new(session));
    let oil = product(5);
    catalog.upsert_product(&oil).await.unwrap();
    let product_id = oil.id;

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let catalog = catalog.clone();
            tokio::spawn(async move { catalog.adjust_stock(product_id, -1).await })
        })
        .collect();

    let mut taken = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => taken += 1,
            Err(CatalogError::InsufficientStock { .. }) | Err(CatalogError::Backend(_)) => {}
            Err(CatalogError::NotFound) => panic!("product vanished"),
        }
    }

    let stored = catalog.get_product(oil.id).await.unwrap().unwrap();
    assert!(taken <= 5);
    assert_eq!(stored.stock, 5 - taken);

    assert!(matches!(
        catalog.adjust_stock(oil.id, -(i64::from(stored.stock) + 1)).await,
        Err(CatalogError::InsufficientStock { .. })
    ));
    assert_eq!(catalog.adjust_stock(oil.id, 2).await.unwrap(), stored.stock + 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs a running ScyllaDB node"]
async fn day_sequence_hands_out_distinct_values() {
    let session = session().await;
    let sequence = Arc::new(ScyllaOrderSequence::new(session));

    // A day no earlier run has touched.
    let offset = (Uuid::new_v4().as_u128() % 200_000) as i64;
    let day = NaiveDate::from_ymd_opt(3000, 1, 1).unwrap() + Duration::days(offset);

    assert_eq!(sequence.next_value(day).await.unwrap(), 1);

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let sequence = sequence.clone();
            tokio::spawn(async move { sequence.next_value(day).await })
        })
        .collect();

    let mut seen = HashSet::from([1]);
    for handle in handles {
        if let Ok(value) = handle.await.unwrap() {
            assert!(seen.insert(value), "value {value} handed out twice");
        }
    }
}

#[tokio::test]
#[ignore = "needs a running ScyllaDB node"]
async fn version_guard_and_owner_listing() {
    let session = session().await;
    let store = ScyllaOrderStore::new(session);
    let owner = Uuid::new_v4();
    let placed = order(owner);
    store.create(&placed).await.unwrap();

    let changes = OrderChanges {
        status: Some(OrderStatus::Processing),
        processing_at: Some(Utc::now()),
        ..OrderChanges::default()
    };

    let updated = match store.update_by_id(placed.id, placed.version, &changes).await.unwrap() {
        UpdateOutcome::Updated(order) => order,
        other => panic!("expected update, got {other:?}"),
    };
    assert_eq!(updated.version, placed.version + 1);

    let stale = store.update_by_id(placed.id, placed.version, &changes).await.unwrap();
    assert_eq!(
        stale,
        UpdateOutcome::Conflict {
            current_version: placed.version + 1
        }
    );

    let mut duplicate = order(owner);
    duplicate.order_number = placed.order_number.clone();
    assert!(store.create(&duplicate).await.is_err());

    let listed = store
        .find_many(&OrderFilter::by_owner(owner), Pagination::new(1, 10))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, OrderStatus::Processing);
    assert_eq!(store.count(&OrderFilter::by_owner(owner)).await.unwrap(), 1);

    let by_number = store
        .find_one(&OrderFilter::by_number(placed.order_number.clone()))
        .await
        .unwrap();
    assert_eq!(by_number.map(|o| o.id), Some(placed.id));
}
