use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use scylla::client::session::Session;
use uuid::Uuid;

use super::{execute_conditional, MAX_CAS_ATTEMPTS};
use crate::domain::catalog::{Catalog, CatalogError, Product};
use crate::domain::order::ProductId;

type ProductRow = (
    Uuid,
    String,
    String,
    Option<String>,
    bool,
    i32,
    Option<Vec<String>>,
);

/// Product lookup and stock adjustment over the `products` table. Stock
/// changes are compare-and-set on the current stock value.
pub struct ScyllaCatalog {
    session: Arc<Session>,
}

impl ScyllaCatalog {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Insert or replace a product row.
    pub async fn upsert_product(&self, product: &Product) -> Result<()> {
        let stock = i32::try_from(product.stock).context("stock exceeds column range")?;

        self.session
            .query_unpaged(
                "INSERT INTO products (id, name, price, discounted_price, is_active, stock, images) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                (
                    product.id,
                    product.name.as_str(),
                    product.price.to_string(),
                    product.discounted_price.map(|p| p.to_string()),
                    product.is_active,
                    stock,
                    product.images.clone(),
                ),
            )
            .await?;

        Ok(())
    }

    async fn current_stock(&self, product_id: ProductId) -> Result<Option<i32>> {
        let row = self
            .session
            .query_unpaged("SELECT stock FROM products WHERE id = ?", (product_id,))
            .await?
            .into_rows_result()?
            .maybe_first_row::<(i32,)>()?;

        Ok(row.map(|(stock,)| stock))
    }
}

fn parse_price(raw: &str, product_id: ProductId) -> Result<Decimal> {
    Decimal::from_str(raw).with_context(|| format!("invalid price '{raw}' for product {product_id}"))
}

#[async_trait]
impl Catalog for ScyllaCatalog {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = self
            .session
            .query_unpaged(
                "SELECT id, name, price, discounted_price, is_active, stock, images \
                 FROM products WHERE id = ?",
                (product_id,),
            )
            .await?
            .into_rows_result()?
            .maybe_first_row::<ProductRow>()?;

        let Some((id, name, price, discounted_price, is_active, stock, images)) = row else {
            return Ok(None);
        };

        Ok(Some(Product {
            id,
            name,
            price: parse_price(&price, id)?,
            discounted_price: discounted_price
                .as_deref()
                .map(|raw| parse_price(raw, id))
                .transpose()?,
            is_active,
            stock: u32::try_from(stock).unwrap_or(0),
            images: images.unwrap_or_default(),
        }))
    }

    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<u32, CatalogError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self
                .current_stock(product_id)
                .await?
                .ok_or(CatalogError::NotFound)?;

            let next = i64::from(current) + delta;
            if next < 0 {
                return Err(CatalogError::InsufficientStock {
                    available: u32::try_from(current).unwrap_or(0),
                });
            }
            let next = i32::try_from(next)
                .map_err(|_| CatalogError::Backend(anyhow::anyhow!("stock overflow for {product_id}")))?;

            let applied = execute_conditional(
                &self.session,
                "UPDATE products SET stock = ? WHERE id = ? IF stock = ?",
                (next, product_id, current),
            )
            .await?;

            if applied {
                return Ok(next as u32);
            }

            tracing::debug!(%product_id, attempt, "Stock changed underneath us, retrying");
        }

        Err(CatalogError::Backend(anyhow::anyhow!(
            "stock for {product_id} still contended after {MAX_CAS_ATTEMPTS} attempts"
        )))
    }
}
