//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub category: Option<String>,
    pub stock: u32,
    pub images: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(name: impl Into<String>, price: Money) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), slug: slugify(&name), name, description: String::new(),
            price, compare_at_price: None, category: None, stock: 0, images: vec![],
            is_active: true, created_at: now, updated_at: now,
        }
    }

    pub fn with_stock(mut self, stock: u32) -> Self { self.stock = stock; self }
    pub fn with_category(mut self, category: impl Into<String>) -> Self { self.category = Some(category.into()); self }
    pub fn with_compare_at_price(mut self, price: Money) -> Self { self.compare_at_price = Some(price); self }

    pub fn is_in_stock(&self) -> bool { self.stock > 0 }
    pub fn is_on_sale(&self) -> bool { self.compare_at_price.is_some_and(|c| c > self.price) }

    /// Checks that `quantity` can be sold right now.
    pub fn ensure_available(&self, quantity: Quantity) -> Result<(), ProductError> {
        if !self.is_active { return Err(ProductError::Unavailable { product_id: self.id }); }
        if quantity.value() > self.stock {
            return Err(ProductError::InsufficientStock { product_id: self.id, requested: quantity.value(), available: self.stock });
        }
        Ok(())
    }
}

/// Lower-case, dash-separated slug used in catalog URLs.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    Unavailable { product_id: Uuid },
    InsufficientStock { product_id: Uuid, requested: u32, available: u32 },
}
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable { product_id } => write!(f, "product {} is not available", product_id),
            Self::InsufficientStock { product_id, requested, available } => {
                write!(f, "product {} has {} in stock, {} requested", product_id, available, requested)
            }
        }
    }
}
