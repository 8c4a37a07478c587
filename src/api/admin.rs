//! Back-office endpoints. Every route here sits behind the admin bearer token.

use axum::{extract::{Path, Query, State}, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{slugify, Coupon, DiscountType, Order, OrderStatus, Product};
use crate::domain::value_objects::{CouponCode, Money};
use crate::persistence::{Page, PageRequest, SalesSummary};
use crate::{Result, StorefrontError};
use super::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OrderListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate { pub status: String }

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    pub discount_type: String,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_purchase: Option<Decimal>,
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveUpdate { pub active: bool }

/// Body of product create and update. An update replaces every editable field.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default, alias = "compare_at_price")]
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, alias = "is_active")]
    pub is_active: Option<bool>,
}

impl ProductRequest {
    fn apply_to(self, mut product: Product) -> Result<Product> {
        self.validate()?;
        if self.price < Decimal::ZERO || self.compare_at_price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(StorefrontError::Validation("prices must not be negative".into()));
        }
        let name = self.name.trim();
        let slug = slugify(self.slug.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or(name));
        if slug.is_empty() {
            return Err(StorefrontError::Validation("slug needs at least one letter or digit".into()));
        }

        product.name = name.to_string();
        product.slug = slug;
        product.description = self.description.trim().to_string();
        product.price = Money::new(self.price);
        product.compare_at_price = self.compare_at_price.map(Money::new);
        product.category = self.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        product.stock = self.stock;
        product.images = self.images.into_iter().filter(|i| !i.trim().is_empty()).collect();
        if let Some(active) = self.is_active { product.is_active = active; }
        product.updated_at = Utc::now();
        Ok(product)
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus> {
    raw.trim().to_lowercase().parse().map_err(StorefrontError::Validation)
}

pub async fn list_orders(State(s): State<AppState>, Query(q): Query<OrderListQuery>) -> Result<Json<Page<Order>>> {
    let status = q.status.as_deref().filter(|s| !s.trim().is_empty()).map(parse_status).transpose()?;
    Ok(Json(s.orders.list_orders(status, PageRequest::new(q.page, q.limit)).await?))
}

pub async fn update_order_status(State(s): State<AppState>, Path(id): Path<Uuid>, Json(body): Json<StatusUpdate>) -> Result<Json<Order>> {
    let status = parse_status(&body.status)?;
    Ok(Json(s.orders.update_status(id, status).await?))
}

pub async fn list_coupons(State(s): State<AppState>) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(s.coupons.list_coupons().await?))
}

pub async fn create_coupon(State(s): State<AppState>, Json(req): Json<CreateCouponRequest>) -> Result<(StatusCode, Json<Coupon>)> {
    req.validate()?;
    let discount_type: DiscountType = req.discount_type.trim().to_lowercase().parse().map_err(StorefrontError::Validation)?;
    let mut coupon = Coupon::create(CouponCode::new(req.code)?, discount_type, req.discount_value)?;
    if let Some(min) = req.min_purchase {
        if min < Decimal::ZERO { return Err(StorefrontError::Validation("minimum purchase must not be negative".into())); }
        coupon = coupon.with_min_purchase(Money::new(min));
    }
    if let Some(max) = req.max_uses { coupon = coupon.with_max_uses(max); }
    if let Some(at) = req.expires_at { coupon = coupon.with_expiry(at); }

    s.coupons.insert_coupon(&coupon).await?;
    info!(code = %coupon.code, discount_type = discount_type.as_str(), value = %coupon.discount_value, "coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}

pub async fn set_coupon_active(State(s): State<AppState>, Path(code): Path<String>, Json(body): Json<ActiveUpdate>) -> Result<Json<Coupon>> {
    let code = CouponCode::new(code)?;
    s.coupons.set_coupon_active(&code, body.active).await?
        .map(Json)
        .ok_or_else(|| StorefrontError::NotFound(format!("coupon {}", code)))
}

pub async fn delete_coupon(State(s): State<AppState>, Path(code): Path<String>) -> Result<StatusCode> {
    let code = CouponCode::new(code)?;
    if s.coupons.delete_coupon(&code).await? {
        info!(code = %code, "coupon deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StorefrontError::NotFound(format!("coupon {}", code)))
    }
}

pub async fn create_product(State(s): State<AppState>, Json(req): Json<ProductRequest>) -> Result<(StatusCode, Json<Product>)> {
    let product = req.apply_to(Product::create(String::new(), Money::ZERO))?;
    s.catalog.insert_product(&product).await?;
    info!(product_id = %product.id, slug = %product.slug, price = %product.price, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(State(s): State<AppState>, Path(id): Path<Uuid>, Json(req): Json<ProductRequest>) -> Result<Json<Product>> {
    let current = s.catalog.find_products(&[id]).await?.into_iter().next()
        .ok_or_else(|| StorefrontError::NotFound(format!("product {}", id)))?;
    let product = req.apply_to(current)?;
    let updated = s.catalog.update_product(&product).await?
        .ok_or_else(|| StorefrontError::NotFound(format!("product {}", id)))?;
    info!(product_id = %id, slug = %updated.slug, price = %updated.price, "product updated");
    Ok(Json(updated))
}

/// Soft delete: the row stays so past orders keep resolving it.
pub async fn delete_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    match s.catalog.set_product_active(id, false).await? {
        Some(_) => {
            info!(product_id = %id, "product deactivated");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(StorefrontError::NotFound(format!("product {}", id))),
    }
}

pub async fn analytics(State(s): State<AppState>) -> Result<Json<SalesSummary>> {
    Ok(Json(s.orders.sales_summary().await?))
}
