use std::sync::Arc;

use rust_decimal::Decimal;

use super::aggregate::OrderDraft;
use super::commands::PlaceOrder;
use super::errors::{OrderError, Unavailability};
use super::events::StockMovement;
use super::value_objects::{OrderLine, PaymentMethod};
use crate::domain::catalog::{Catalog, CatalogError};

// ============================================================================
// Checkout - Pricing and stock reservation
// ============================================================================
//
// Placement runs in two phases. `price_order` validates every requested line
// against the catalog without touching stock. Only then does
// `StockReservation::reserve` take stock line by line with conditional
// decrements, handing back whatever it already took if any line fails.
//
// ============================================================================

/// Validate a checkout request and turn it into an order draft priced from
/// the catalog. Lines are checked in request order; the first failing line
/// decides the error.
pub async fn price_order(
    catalog: &dyn Catalog,
    request: &PlaceOrder,
    tolerance: Decimal,
) -> Result<OrderDraft, OrderError> {
    if request.lines.is_empty() {
        return Err(OrderError::EmptyOrder);
    }

    if let Some(line) = request.lines.iter().find(|line| line.quantity == 0) {
        return Err(OrderError::InvalidQuantity {
            product_id: line.product_id,
            quantity: line.quantity,
        });
    }

    let payment_method: PaymentMethod = request.payment_method.parse()?;

    let mut items = Vec::with_capacity(request.lines.len());

    for line in &request.lines {
        let product = catalog
            .get_product(line.product_id)
            .await?
            .ok_or(OrderError::ProductNotFound(line.product_id))?;

        if !product.is_active {
            return Err(OrderError::ProductUnavailable {
                product_id: product.id,
                name: product.name,
                reason: Unavailability::Inactive,
            });
        }

        if product.stock < line.quantity {
            return Err(OrderError::ProductUnavailable {
                product_id: product.id,
                name: product.name,
                reason: Unavailability::InsufficientStock {
                    requested: line.quantity,
                    available: product.stock,
                },
            });
        }

        let price = product.effective_price();
        if (line.unit_price - price).abs() > tolerance {
            return Err(OrderError::PriceMismatch {
                product_id: product.id,
                expected: price,
                supplied: line.unit_price,
            });
        }

        items.push(OrderLine {
            product_id: product.id,
            image: product.primary_image(),
            name: product.name,
            price,
            quantity: line.quantity,
        });
    }

    Ok(OrderDraft {
        owner_id: request.owner_id,
        items,
        shipping_address: request.shipping_address.clone(),
        payment_method,
        notes: request.notes.clone(),
    })
}

/// Stock taken for one checkout. Either `commit` it once the order is
/// persisted or `release` it to hand the units back.
#[must_use = "a reservation must be committed or released"]
pub struct StockReservation {
    catalog: Arc<dyn Catalog>,
    held: Vec<StockMovement>,
}

impl StockReservation {
    /// Decrement stock for every line. If any decrement is refused, the ones
    /// already applied are reverted before the error is returned.
    pub async fn reserve(catalog: Arc<dyn Catalog>, lines: &[OrderLine]) -> Result<Self, OrderError> {
        let mut reservation = Self {
            catalog,
            held: Vec::with_capacity(lines.len()),
        };

        for line in lines {
            let outcome = reservation
                .catalog
                .adjust_stock(line.product_id, -i64::from(line.quantity))
                .await;

            match outcome {
                Ok(remaining) => {
                    tracing::debug!(product_id = %line.product_id, quantity = line.quantity, remaining, "Stock reserved");
                    reservation.held.push(StockMovement {
                        product_id: line.product_id,
                        quantity: line.quantity,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        error = %e,
                        already_held = reservation.held.len(),
                        "Stock reservation refused, releasing held lines"
                    );
                    reservation.release().await;
                    return Err(reservation_error(line, e));
                }
            }
        }

        Ok(reservation)
    }

    /// Total units held.
    pub fn units(&self) -> u64 {
        self.held.iter().map(|m| u64::from(m.quantity)).sum()
    }

    /// Keep the stock taken; returns the number of units.
    pub fn commit(self) -> u64 {
        self.units()
    }

    /// Return every held unit to the catalog, newest reservation first.
    pub async fn release(self) {
        for movement in self.held.iter().rev() {
            if let Err(e) = self
                .catalog
                .adjust_stock(movement.product_id, i64::from(movement.quantity))
                .await
            {
                tracing::error!(
                    product_id = %movement.product_id,
                    quantity = movement.quantity,
                    error = %e,
                    "Failed to release reserved stock"
                );
            }
        }
    }
}

fn reservation_error(line: &OrderLine, error: CatalogError) -> OrderError {
    match error {
        CatalogError::InsufficientStock { available } => OrderError::ProductUnavailable {
            product_id: line.product_id,
            name: line.name.clone(),
            reason: Unavailability::InsufficientStock {
                requested: line.quantity,
                available,
            },
        },
        CatalogError::NotFound => OrderError::ProductNotFound(line.product_id),
        CatalogError::Backend(e) => OrderError::Backend(e),
    }
}

/// What a restock pass achieved. Lines the catalog could not take back
/// stay in `unsettled` so a later pass can retry them.
#[derive(Debug, Default)]
pub struct Restock {
    pub restored: Vec<StockMovement>,
    pub unsettled: Vec<StockMovement>,
    pub failure: Option<anyhow::Error>,
}

impl Restock {
    pub fn units(&self) -> u64 {
        self.restored.iter().map(|m| u64::from(m.quantity)).sum()
    }
}

/// Give cancelled stock back to the catalog. Products that have since left
/// the catalog are skipped. A backend failure on one line does not stop the
/// others; the first failure is kept.
pub async fn restore_stock(catalog: &dyn Catalog, movements: &[StockMovement]) -> Restock {
    let mut restock = Restock::default();

    for movement in movements {
        match catalog
            .adjust_stock(movement.product_id, i64::from(movement.quantity))
            .await
        {
            Ok(_) => restock.restored.push(*movement),
            Err(CatalogError::NotFound) => {
                tracing::warn!(product_id = %movement.product_id, "Product gone, stock not restored");
            }
            Err(CatalogError::InsufficientStock { available }) => {
                tracing::warn!(
                    product_id = %movement.product_id,
                    quantity = movement.quantity,
                    available,
                    "Catalog refused a stock increase, stock not restored"
                );
            }
            Err(CatalogError::Backend(e)) => {
                tracing::error!(product_id = %movement.product_id, error = %e, "Stock restoration failed");
                restock.unsettled.push(*movement);
                restock.failure.get_or_insert(e);
            }
        }
    }

    restock
}
