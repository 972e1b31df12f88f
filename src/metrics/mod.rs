mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order engine
// ============================================================================
//
// Covers:
// - Order placement, rejections by reason, and operation latency
// - Status transitions, payment outcomes and cancellations
// - Stock units reserved/restored and reservation rollbacks
// - Notification delivery, retries and circuit breaker state
//
// All metrics live in one registry scraped via /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Order Operations
    pub orders_placed: IntCounter,
    pub order_rejections: IntCounterVec,
    pub operation_duration: HistogramVec,
    pub status_transitions: IntCounterVec,
    pub payments_recorded: IntCounterVec,
    pub cancellations: IntCounter,

    // Stock
    pub stock_units_reserved: IntCounter,
    pub stock_units_restored: IntCounter,
    pub restock_deferred_units: IntCounter,
    pub reservation_rollbacks: IntCounter,

    // Notifications
    pub notifications_published: IntCounterVec,
    pub notifications_failed: IntCounterVec,
    pub notification_retries: IntCounterVec,
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_placed = IntCounter::new("orders_placed_total", "Total orders placed")?;
        registry.register(Box::new(orders_placed.clone()))?;

        let order_rejections = IntCounterVec::new(
            Opts::new("order_rejections_total", "Order operations rejected, by reason"),
            &["operation", "reason"],
        )?;
        registry.register(Box::new(order_rejections.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Order operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let payments_recorded = IntCounterVec::new(
            Opts::new("order_payments_recorded_total", "Payment outcomes recorded"),
            &["status"],
        )?;
        registry.register(Box::new(payments_recorded.clone()))?;

        let cancellations = IntCounter::new("order_cancellations_total", "Orders cancelled")?;
        registry.register(Box::new(cancellations.clone()))?;

        let stock_units_reserved = IntCounter::new(
            "stock_units_reserved_total",
            "Units decremented from catalog stock by placed orders",
        )?;
        registry.register(Box::new(stock_units_reserved.clone()))?;

        let stock_units_restored = IntCounter::new(
            "stock_units_restored_total",
            "Units returned to catalog stock by cancellations",
        )?;
        registry.register(Box::new(stock_units_restored.clone()))?;

        let restock_deferred_units = IntCounter::new(
            "stock_restock_deferred_units_total",
            "Units a cancelled order still owes after a failed restock pass",
        )?;
        registry.register(Box::new(restock_deferred_units.clone()))?;

        let reservation_rollbacks = IntCounter::new(
            "stock_reservation_rollbacks_total",
            "Placements whose partial reservations were released",
        )?;
        registry.register(Box::new(reservation_rollbacks.clone()))?;

        let notifications_published = IntCounterVec::new(
            Opts::new("notifications_published_total", "Order notifications delivered"),
            &["event_type"],
        )?;
        registry.register(Box::new(notifications_published.clone()))?;

        let notifications_failed = IntCounterVec::new(
            Opts::new("notifications_failed_total", "Order notifications dropped"),
            &["event_type", "reason"],
        )?;
        registry.register(Box::new(notifications_failed.clone()))?;

        let notification_retries = IntCounterVec::new(
            Opts::new("notification_retry_attempts_total", "Notification delivery attempts"),
            &["attempt"],
        )?;
        registry.register(Box::new(notification_retries.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "notification_circuit_breaker_state",
            "Notification circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            order_rejections,
            operation_duration,
            status_transitions,
            payments_recorded,
            cancellations,
            stock_units_reserved,
            stock_units_restored,
            restock_deferred_units,
            reservation_rollbacks,
            notifications_published,
            notifications_failed,
            notification_retries,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observe_operation(&self, operation: &str, duration_secs: f64) {
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn record_rejection(&self, operation: &str, reason: &str) {
        self.order_rejections
            .with_label_values(&[operation, reason])
            .inc();
    }

    pub fn record_placed(&self, units: u64) {
        self.orders_placed.inc();
        self.stock_units_reserved.inc_by(units);
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.status_transitions.with_label_values(&[from, to]).inc();
    }

    pub fn record_payment(&self, status: &str) {
        self.payments_recorded.with_label_values(&[status]).inc();
    }

    pub fn record_cancellation(&self) {
        self.cancellations.inc();
    }

    pub fn record_restock(&self, restored_units: u64, deferred_units: u64) {
        self.stock_units_restored.inc_by(restored_units);
        self.restock_deferred_units.inc_by(deferred_units);
    }

    pub fn record_rollback(&self) {
        self.reservation_rollbacks.inc();
    }

    pub fn record_notification(&self, event_type: &str, outcome: Result<(), &str>) {
        match outcome {
            Ok(()) => self
                .notifications_published
                .with_label_values(&[event_type])
                .inc(),
            Err(reason) => self
                .notifications_failed
                .with_label_values(&[event_type, reason])
                .inc(),
        }
    }

    pub fn record_notification_attempt(&self, attempt: u32) {
        self.notification_retries
            .with_label_values(&[&attempt.to_string()])
            .inc();
    }

    pub fn set_circuit_breaker_state(&self, state: i64) {
        self.circuit_breaker_state.set(state);
    }
}
