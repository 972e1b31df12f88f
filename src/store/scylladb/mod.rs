// ============================================================================
// ScyllaDB Backend
// ============================================================================
//
// Orders are stored as JSON documents next to the columns the conditional
// writes need (`version`, `order_number`). Every write that must not race
// (stock, day sequence, order number, order version) is a lightweight
// transaction whose `[applied]` flag decides the outcome. A secondary index
// on `owner_id` serves per-customer listings.
//
// ============================================================================

mod catalog;
mod orders;
mod sequence;

use std::sync::Arc;

use anyhow::Result;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::serialize::row::SerializeRow;
use scylla::value::{CqlValue, Row};

use crate::config::ScyllaSettings;

pub use catalog::ScyllaCatalog;
pub use orders::ScyllaOrderStore;
pub use sequence::ScyllaOrderSequence;

/// Bound on compare-and-set retries when a conditional write loses a race.
const MAX_CAS_ATTEMPTS: usize = 16;

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS orders (
        id uuid PRIMARY KEY,
        order_number text,
        owner_id uuid,
        status text,
        created_at timestamp,
        version bigint,
        document text
    )",
    "CREATE INDEX IF NOT EXISTS orders_by_owner ON orders (owner_id)",
    "CREATE TABLE IF NOT EXISTS orders_by_number (
        order_number text PRIMARY KEY,
        order_id uuid
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id uuid PRIMARY KEY,
        name text,
        price text,
        discounted_price text,
        is_active boolean,
        stock int,
        images list<text>
    )",
    "CREATE TABLE IF NOT EXISTS order_sequences (
        day text PRIMARY KEY,
        value int
    )",
];

/// Connect to the cluster and switch to the configured keyspace, creating
/// it and the order tables when missing.
pub async fn connect(settings: &ScyllaSettings) -> Result<Arc<Session>> {
    tracing::info!(nodes = ?settings.known_nodes, keyspace = %settings.keyspace, "Connecting to ScyllaDB");

    let session: Session = SessionBuilder::new()
        .known_nodes(&settings.known_nodes)
        .build()
        .await?;

    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
                settings.keyspace, settings.replication_factor
            ),
            &[],
        )
        .await?;

    session.use_keyspace(&settings.keyspace, false).await?;

    for statement in SCHEMA {
        session.query_unpaged(statement, &[]).await?;
    }

    tracing::info!(keyspace = %settings.keyspace, "ScyllaDB schema ready");
    Ok(Arc::new(session))
}

/// Run a lightweight transaction and report whether it was applied.
async fn execute_conditional(
    session: &Session,
    statement: &str,
    values: impl SerializeRow,
) -> Result<bool> {
    let rows = session
        .query_unpaged(statement, values)
        .await?
        .into_rows_result()?;

    Ok(applied(rows.maybe_first_row::<Row>()?))
}

/// LWT responses lead with an `[applied]` boolean, followed by the current
/// values when the condition failed.
fn applied(row: Option<Row>) -> bool {
    let flag = row
        .and_then(|row| row.columns.into_iter().next())
        .flatten();

    matches!(flag, Some(CqlValue::Boolean(true)))
}
