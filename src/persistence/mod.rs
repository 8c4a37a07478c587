//! Persistence ports and their adapters.
//!
//! [`PgStore`] is the production adapter. [`MemoryStore`] implements the same traits
//! in process and backs the test suites.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::{Coupon, Order, OrderStatus, Product, Settlement, SettlementEffect};
use crate::domain::value_objects::{CouponCode, Money};
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest { pub page: u32, pub limit: u32 }

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self { page: page.unwrap_or(1).max(1), limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) }
    }
    pub fn offset(&self) -> u64 { u64::from(self.page - 1) * u64::from(self.limit) }
}

impl Default for PageRequest {
    fn default() -> Self { Self::new(None, None) }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let total_pages = u32::try_from(total.div_ceil(u64::from(request.limit))).unwrap_or(u32::MAX);
        Self {
            items, total, page: request.page, limit: request.limit, total_pages,
            has_next_page: request.page < total_pages,
            has_previous_page: request.page > 1,
        }
    }
}

/// Catalog search. Only active products are ever listed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub categories: Vec<String>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    pub in_stock: bool,
    pub on_sale: bool,
}

impl ProductFilter {
    pub fn matches(&self, p: &Product) -> bool {
        p.is_active
            && self.search.as_deref().map_or(true, |s| p.name.to_lowercase().contains(&s.to_lowercase()))
            && (self.categories.is_empty() || p.category.as_ref().is_some_and(|c| self.categories.contains(c)))
            && self.min_price.map_or(true, |min| p.price >= min)
            && self.max_price.map_or(true, |max| p.price <= max)
            && (!self.in_stock || p.is_in_stock())
            && (!self.on_sale || p.is_on_sale())
    }
}

/// Result of writing one settlement.
#[derive(Clone, Debug)]
pub struct SettlementRecord {
    /// State after the write, carrying any events raised by it.
    pub order: Order,
    pub effect: SettlementEffect,
    /// Set when this write consumed the order's coupon.
    pub redeemed_coupon: Option<CouponCode>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub paid_orders: u64,
    pub revenue: Money,
    pub discounts: Money,
    pub average_order_value: Money,
    pub daily: Vec<DailySales>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySales { pub day: NaiveDate, pub orders: u64, pub revenue: Money, pub discounts: Money }

/// Days of history in [`SalesSummary::daily`].
pub const SALES_HISTORY_DAYS: usize = 30;

impl SalesSummary {
    pub fn new(paid_orders: u64, revenue: Money, discounts: Money, daily: Vec<DailySales>) -> Self {
        let average_order_value = if paid_orders == 0 {
            Money::ZERO
        } else {
            Money::new(revenue.amount() / rust_decimal::Decimal::from(paid_orders)).round()
        };
        Self { paid_orders, revenue, discounts, average_order_value, daily }
    }
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> Result<Page<Product>>;
    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>>;
    /// Looks products up by id whether active or not.
    async fn find_products(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
    /// Fails with `Conflict` when the slug is taken.
    async fn insert_product(&self, product: &Product) -> Result<()>;
    /// Overwrites the stored product with the same id. `None` if there is none;
    /// `Conflict` when the new slug belongs to another product.
    async fn update_product(&self, product: &Product) -> Result<Option<Product>>;
    async fn set_product_active(&self, id: Uuid, active: bool) -> Result<Option<Product>>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_coupon(&self, code: &CouponCode) -> Result<Option<Coupon>>;
    async fn list_coupons(&self) -> Result<Vec<Coupon>>;
    /// Fails with `Conflict` when the code is taken.
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;
    async fn set_coupon_active(&self, code: &CouponCode, active: bool) -> Result<Option<Coupon>>;
    async fn delete_coupon(&self, code: &CouponCode) -> Result<bool>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>>;

    /// Inserts unless an order with the same id exists. Returns whether it inserted.
    async fn insert_order(&self, order: &Order) -> Result<bool>;

    /// Overwrites the draft-derived fields of a stored order, provided the stored
    /// row is still unlocked. Fails with `OrderError::Locked` otherwise.
    async fn replace_order(&self, order: &Order) -> Result<Order>;

    /// Applies a settlement under a row lock and, when the order first becomes
    /// paid, consumes its coupon in the same write. `None` if the order is unknown.
    async fn record_settlement(&self, id: Uuid, settlement: &Settlement) -> Result<Option<SettlementRecord>>;

    async fn transition_order(&self, id: Uuid, target: OrderStatus) -> Result<Order>;

    async fn list_orders(&self, status: Option<OrderStatus>, page: PageRequest) -> Result<Page<Order>>;

    async fn sales_summary(&self) -> Result<SalesSummary>;
}
