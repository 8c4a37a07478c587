use axum::{extract::{Path, Query, State}, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use crate::domain::aggregates::Product;
use crate::domain::value_objects::Money;
use crate::persistence::{Page, PageRequest, ProductFilter};
use crate::{Result, StorefrontError};
use super::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    /// Comma-separated category names.
    pub categories: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: Option<bool>,
    pub on_sale: Option<bool>,
}

impl ProductQuery {
    fn filter(&self) -> ProductFilter {
        ProductFilter {
            search: self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string),
            categories: self.categories.as_deref().unwrap_or_default()
                .split(',').map(str::trim).filter(|c| !c.is_empty()).map(str::to_string).collect(),
            min_price: self.min_price.map(Money::new),
            max_price: self.max_price.map(Money::new),
            in_stock: self.in_stock.unwrap_or(false),
            on_sale: self.on_sale.unwrap_or(false),
        }
    }
}

pub async fn list_products(State(s): State<AppState>, Query(q): Query<ProductQuery>) -> Result<Json<Page<Product>>> {
    let page = PageRequest::new(q.page, q.limit);
    Ok(Json(s.catalog.list_products(&q.filter(), page).await?))
}

pub async fn get_product(State(s): State<AppState>, Path(slug): Path<String>) -> Result<Json<Product>> {
    s.catalog.find_product_by_slug(&slug).await?
        .map(Json)
        .ok_or_else(|| StorefrontError::NotFound(format!("product {}", slug)))
}
