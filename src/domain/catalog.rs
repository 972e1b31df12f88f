use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::ProductId;

// ============================================================================
// Catalog Lookup - External collaborator
// ============================================================================
//
// The catalog owns product prices and stock. The order engine only reads
// snapshots and issues signed stock deltas.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub discounted_price: Option<Decimal>,
    pub is_active: bool,
    pub stock: u32,
    pub images: Vec<String>,
}

impl Product {
    /// The price a customer pays: the discounted price when one is set.
    pub fn effective_price(&self) -> Decimal {
        self.discounted_price.unwrap_or(self.price)
    }

    pub fn primary_image(&self) -> Option<String> {
        self.images.first().cloned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Product not found in catalog")]
    NotFound,

    #[error("Insufficient stock: {available} available")]
    InsufficientStock { available: u32 },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, product_id: ProductId) -> anyhow::Result<Option<Product>>;

    /// Apply a signed delta to stock as one conditional operation. A negative
    /// delta only applies when the current stock covers it. Returns the new
    /// stock level.
    async fn adjust_stock(&self, product_id: ProductId, delta: i64) -> Result<u32, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn oil(discounted_price: Option<Decimal>) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Hojiblanca 750ml".to_string(),
            price: dec!(18.00),
            discounted_price,
            is_active: true,
            stock: 10,
            images: vec!["hojiblanca.jpg".to_string(), "label.jpg".to_string()],
        }
    }

    #[test]
    fn test_discounted_price_takes_precedence() {
        assert_eq!(oil(Some(dec!(15.50))).effective_price(), dec!(15.50));
        assert_eq!(oil(None).effective_price(), dec!(18.00));
    }

    #[test]
    fn test_primary_image() {
        assert_eq!(oil(None).primary_image().as_deref(), Some("hojiblanca.jpg"));
    }
}
