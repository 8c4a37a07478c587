//! Cart Aggregate
//!
//! The cart belongs to the client. The server rebuilds one from each quote or order
//! request so the merge invariant holds regardless of what the client sent.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Quantity;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    #[serde(default)]
    pub variant: Option<String>,
    pub quantity: Quantity,
}

impl CartItem {
    pub fn new(product_id: Uuid, variant: Option<String>, quantity: u32) -> Result<Self, CartError> {
        let quantity = Quantity::new(quantity).ok_or(CartError::InvalidQuantity { product_id })?;
        Ok(Self { product_id, variant, quantity })
    }
    fn same_line(&self, product_id: Uuid, variant: Option<&str>) -> bool {
        self.product_id == product_id && self.variant.as_deref() == variant
    }
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    /// Builds a cart from raw request lines, merging duplicates in first-seen order.
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Self {
        let mut cart = Self::new();
        for item in items { cart.add_item(item); }
        cart
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn product_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.items.iter().map(|i| i.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn add_item(&mut self, item: CartItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.same_line(item.product_id, item.variant.as_deref())) {
            existing.quantity = existing.quantity.add(item.quantity);
        } else {
            self.items.push(item);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartError { InvalidQuantity { product_id: Uuid } }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuantity { product_id } => write!(f, "quantity for product {} must be at least 1", product_id),
        }
    }
}
