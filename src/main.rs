use std::sync::Arc;

use rust_decimal::Decimal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use olive_orders::config::{Settings, SinkKind};
use olive_orders::domain::catalog::{Catalog, Product};
use olive_orders::domain::order::{
    OrderCommandHandler, OrderQueries, OrderQuery, OrderStatus, PaymentUpdate, PlaceOrder,
    RequestedLine, Requester, ShippingAddress, StatusUpdate,
};
use olive_orders::messaging::{EventPublisher, LogSink, NotificationSink};
use olive_orders::metrics::{self, Metrics};
use olive_orders::store::{self, ScyllaCatalog, ScyllaOrderSequence, ScyllaOrderStore};
use olive_orders::utils::SystemClock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,olive_orders=debug")),
        )
        .init();

    tracing::info!("Starting olive-oil order engine demo");

    let settings = Settings::load()?;

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    if settings.metrics.enabled {
        let registry = metrics.registry().clone();
        let port = settings.metrics.port;
        std::thread::spawn(move || {
            let system = actix_web::rt::System::new();
            if let Err(e) = system.block_on(metrics::start_metrics_server(registry, port)) {
                tracing::error!(error = %e, "Metrics server error");
            }
        });
    }

    // === 2. ScyllaDB ===
    let session = store::scylladb::connect(&settings.scylla).await?;
    let orders = Arc::new(ScyllaOrderStore::new(session.clone()));
    let catalog = Arc::new(ScyllaCatalog::new(session.clone()));
    let sequence = Arc::new(ScyllaOrderSequence::new(session));

    // === 3. Notifications ===
    let sink = notification_sink(&settings)?;
    let publisher = Arc::new(EventPublisher::new(
        sink,
        settings.notifications.retry_policy(),
        settings.notifications.breaker_config(),
        metrics.clone(),
    ));

    let handler = OrderCommandHandler::new(
        orders.clone(),
        catalog.clone(),
        sequence,
        publisher,
        Arc::new(SystemClock),
        metrics.clone(),
        settings.orders.clone(),
    );
    let queries = OrderQueries::new(orders, settings.orders.clone());

    // === 4. Seed the catalog ===
    let picual = Product {
        id: Uuid::new_v4(),
        name: "Picual Early Harvest 500ml".to_string(),
        price: Decimal::new(1890, 2),
        discounted_price: Some(Decimal::new(1690, 2)),
        is_active: true,
        stock: 24,
        images: vec!["picual-500.jpg".to_string()],
    };
    catalog.upsert_product(&picual).await?;
    tracing::info!(product_id = %picual.id, stock = picual.stock, "Seeded product");

    // === 5. Order lifecycle ===
    let customer = Requester::customer(Uuid::new_v4());
    let admin = Requester::admin(Uuid::new_v4());

    let order = handler
        .place_order(checkout(customer, &picual, 3))
        .await?;
    tracing::info!(order_number = %order.order_number, total = %order.total, "Order placed");

    handler
        .update_payment(
            customer,
            order.id,
            PaymentUpdate::new("card", "paid").with_reference("pi_demo_001"),
        )
        .await?;

    handler
        .update_status(
            admin,
            order.id,
            StatusUpdate::to(OrderStatus::Shipped)
                .with_tracking_number("SEUR-000184223")
                .with_admin_note("Shipped in insulated box"),
        )
        .await?;

    handler
        .update_status(admin, order.id, StatusUpdate::to(OrderStatus::Delivered))
        .await?;

    let tracking = queries.track_order(order.order_number.as_str()).await?;
    for entry in &tracking.history {
        tracing::info!(
            status = %entry.status,
            date = %entry.date,
            completed = entry.completed,
            "{}",
            entry.description
        );
    }

    // === 6. Cancellation returns stock ===
    let second = handler.place_order(checkout(customer, &picual, 2)).await?;
    handler.cancel_order(customer, second.id).await?;

    let remaining = catalog
        .get_product(picual.id)
        .await?
        .map(|p| p.stock)
        .unwrap_or_default();
    tracing::info!(remaining, "Stock after one delivered and one cancelled order");

    let page = queries.list_orders(customer, OrderQuery::default()).await?;
    tracing::info!(orders = page.total, "Customer order history");

    tracing::info!("Demo complete");
    Ok(())
}

fn checkout(customer: Requester, product: &Product, quantity: u32) -> PlaceOrder {
    PlaceOrder {
        owner_id: customer.account_id,
        lines: vec![RequestedLine {
            product_id: product.id,
            quantity,
            unit_price: product.effective_price(),
        }],
        shipping_address: ShippingAddress {
            full_name: "Carmen Ruiz".to_string(),
            email: "carmen@example.com".to_string(),
            phone: "+34 953 000 000".to_string(),
            address_line1: "Avenida de Andalucía 5".to_string(),
            address_line2: None,
            city: "Úbeda".to_string(),
            region: Some("Jaén".to_string()),
            postal_code: "23400".to_string(),
            country: "ES".to_string(),
        },
        payment_method: "card".to_string(),
        notes: None,
    }
}

fn notification_sink(settings: &Settings) -> anyhow::Result<Arc<dyn NotificationSink>> {
    match settings.notifications.sink {
        SinkKind::Log => Ok(Arc::new(LogSink)),
        #[cfg(feature = "redpanda")]
        SinkKind::Redpanda => Ok(Arc::new(olive_orders::messaging::RedpandaSink::new(
            &settings.redpanda,
        )?)),
        #[cfg(not(feature = "redpanda"))]
        SinkKind::Redpanda => {
            tracing::warn!("Built without the redpanda feature, logging notifications instead");
            Ok(Arc::new(LogSink))
        }
    }
}
