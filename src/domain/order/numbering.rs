use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::value_objects::OrderNumber;
use crate::store::OrderSequence;

// ============================================================================
// Order Number Allocation
// ============================================================================
//
// `ORD` + yymmdd (UTC) + a per-day counter padded to four digits. The
// counter is a dedicated atomic sequence, so concurrent checkouts never
// derive their number from a count of existing orders.
//
// ============================================================================

#[derive(Clone)]
pub struct OrderNumberAllocator {
    sequence: Arc<dyn OrderSequence>,
}

impl OrderNumberAllocator {
    pub fn new(sequence: Arc<dyn OrderSequence>) -> Self {
        Self { sequence }
    }

    pub async fn allocate(&self, now: DateTime<Utc>) -> Result<OrderNumber> {
        let day = now.date_naive();
        let value = self.sequence.next_value(day).await?;
        let number = OrderNumber::compose(day, value);

        tracing::debug!(order_number = %number, %day, "Allocated order number");
        Ok(number)
    }
}
