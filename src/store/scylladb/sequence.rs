use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use scylla::client::session::Session;

use super::{execute_conditional, MAX_CAS_ATTEMPTS};
use crate::store::OrderSequence;

/// Per-day counter in `order_sequences`, advanced with compare-and-set.
pub struct ScyllaOrderSequence {
    session: Arc<Session>,
}

impl ScyllaOrderSequence {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn current(&self, day: &str) -> Result<Option<i32>> {
        let row = self
            .session
            .query_unpaged("SELECT value FROM order_sequences WHERE day = ?", (day,))
            .await?
            .into_rows_result()?
            .maybe_first_row::<(i32,)>()?;

        Ok(row.map(|(value,)| value))
    }
}

#[async_trait]
impl OrderSequence for ScyllaOrderSequence {
    async fn next_value(&self, day: NaiveDate) -> Result<u32> {
        let key = day.format("%Y-%m-%d").to_string();

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let applied_value = match self.current(&key).await? {
                None => {
                    let applied = execute_conditional(
                        &self.session,
                        "INSERT INTO order_sequences (day, value) VALUES (?, ?) IF NOT EXISTS",
                        (key.as_str(), 1_i32),
                    )
                    .await?;
                    applied.then_some(1)
                }
                Some(value) => {
                    let next = value + 1;
                    let applied = execute_conditional(
                        &self.session,
                        "UPDATE order_sequences SET value = ? WHERE day = ? IF value = ?",
                        (next, key.as_str(), value),
                    )
                    .await?;
                    applied.then_some(next)
                }
            };

            if let Some(value) = applied_value {
                return Ok(value as u32);
            }

            tracing::debug!(day = %key, attempt, "Order sequence contended, retrying");
        }

        bail!("order sequence for {key} still contended after {MAX_CAS_ATTEMPTS} attempts")
    }
}
