//! In-process store. Every write takes the single state lock, which plays the
//! role of the row locks [`super::PgStore`] relies on.

use std::collections::BTreeMap;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::domain::aggregates::{Coupon, Order, OrderError, OrderStatus, PaymentStatus, Product, Settlement, SettlementEffect};
use crate::domain::value_objects::{CouponCode, Money};
use crate::{Result, StorefrontError};
use super::{
    CouponRepository, DailySales, OrderRepository, Page, PageRequest, ProductFilter, ProductRepository,
    SalesSummary, SettlementRecord, SALES_HISTORY_DAYS,
};

#[derive(Debug, Default)]
pub struct MemoryStore { state: RwLock<State> }

#[derive(Debug, Default)]
struct State {
    products: Vec<Product>,
    coupons: Vec<Coupon>,
    grants: Vec<CouponGrant>,
    orders: Vec<Order>,
}

#[derive(Debug)]
struct CouponGrant { user_id: Uuid, coupon_id: Uuid, is_used: bool }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn add_product(&self, product: Product) { self.state.write().await.products.push(product); }
    pub async fn add_coupon(&self, coupon: Coupon) { self.state.write().await.coupons.push(coupon); }

    /// Assigns a coupon to a user account.
    pub async fn grant_coupon(&self, user_id: Uuid, coupon_id: Uuid) {
        self.state.write().await.grants.push(CouponGrant { user_id, coupon_id, is_used: false });
    }

    pub async fn coupon_grant_used(&self, user_id: Uuid, coupon_id: Uuid) -> Option<bool> {
        self.state.read().await.grants.iter().find(|g| g.user_id == user_id && g.coupon_id == coupon_id).map(|g| g.is_used)
    }

    pub async fn order_count(&self) -> usize { self.state.read().await.orders.len() }
}

fn stored(order: &Order) -> Order {
    let mut copy = order.clone();
    copy.take_events();
    copy
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> Result<Page<Product>> {
        let state = self.state.read().await;
        let mut matching: Vec<&Product> = state.products.iter().filter(|p| filter.matches(p)).collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        let total = matching.len() as u64;
        let items = matching.into_iter().skip(page.offset() as usize).take(page.limit as usize).cloned().collect();
        Ok(Page::new(items, total, page))
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.iter().find(|p| p.slug == slug && p.is_active).cloned())
    }

    async fn find_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        Ok(self.state.read().await.products.iter().filter(|p| ids.contains(&p.id)).cloned().collect())
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.write().await;
        if state.products.iter().any(|p| p.slug == product.slug) {
            return Err(StorefrontError::Conflict(format!("product slug {} already exists", product.slug)));
        }
        state.products.push(product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<Option<Product>> {
        let mut state = self.state.write().await;
        if state.products.iter().any(|p| p.slug == product.slug && p.id != product.id) {
            return Err(StorefrontError::Conflict(format!("product slug {} already exists", product.slug)));
        }
        Ok(state.products.iter_mut().find(|p| p.id == product.id).map(|p| {
            *p = product.clone();
            p.clone()
        }))
    }

    async fn set_product_active(&self, id: Uuid, active: bool) -> Result<Option<Product>> {
        let mut state = self.state.write().await;
        Ok(state.products.iter_mut().find(|p| p.id == id).map(|p| {
            p.is_active = active;
            p.updated_at = Utc::now();
            p.clone()
        }))
    }
}

#[async_trait]
impl CouponRepository for MemoryStore {
    async fn find_coupon(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.iter().find(|c| &c.code == code).cloned())
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let mut coupons = self.state.read().await.coupons.clone();
        coupons.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(coupons)
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut state = self.state.write().await;
        if state.coupons.iter().any(|c| c.code == coupon.code) {
            return Err(StorefrontError::Conflict(format!("coupon {} already exists", coupon.code)));
        }
        state.coupons.push(coupon.clone());
        Ok(())
    }

    async fn set_coupon_active(&self, code: &CouponCode, active: bool) -> Result<Option<Coupon>> {
        let mut state = self.state.write().await;
        Ok(state.coupons.iter_mut().find(|c| &c.code == code).map(|c| {
            c.is_active = active;
            c.clone()
        }))
    }

    async fn delete_coupon(&self, code: &CouponCode) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(coupon_id) = state.coupons.iter().find(|c| &c.code == code).map(|c| c.id) else { return Ok(false) };
        state.coupons.retain(|c| c.id != coupon_id);
        state.grants.retain(|g| g.coupon_id != coupon_id);
        Ok(true)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.iter().find(|o| o.id() == id).cloned())
    }

    async fn insert_order(&self, order: &Order) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.orders.iter().any(|o| o.id() == order.id()) { return Ok(false); }
        state.orders.push(stored(order));
        Ok(true)
    }

    async fn replace_order(&self, order: &Order) -> Result<Order> {
        let mut state = self.state.write().await;
        let current = state.orders.iter_mut().find(|o| o.id() == order.id())
            .ok_or_else(|| StorefrontError::NotFound(format!("order {}", order.id())))?;
        if current.is_locked() {
            return Err(OrderError::Locked { status: current.status(), payment_status: current.payment_status() }.into());
        }
        current.user_id = order.user_id;
        current.customer = order.customer.clone();
        current.shipping_address = order.shipping_address.clone();
        current.items = order.items.clone();
        current.totals = order.totals;
        current.coupon_code = order.coupon_code.clone();
        current.payment_method = order.payment_method.clone();
        current.notes = order.notes.clone();
        current.updated_at = order.updated_at;
        Ok(current.clone())
    }

    async fn record_settlement(&self, id: Uuid, settlement: &Settlement) -> Result<Option<SettlementRecord>> {
        let mut state = self.state.write().await;
        let State { orders, coupons, grants, .. } = &mut *state;
        let Some(current) = orders.iter_mut().find(|o| o.id() == id) else { return Ok(None) };

        let mut order = current.clone();
        let effect = order.apply_settlement(settlement);
        if effect == SettlementEffect::IgnoredStale {
            return Ok(Some(SettlementRecord { order, effect, redeemed_coupon: None }));
        }
        let redeemed_coupon = order.claim_coupon_redemption();
        if let Some(code) = &redeemed_coupon {
            if let Some(coupon) = coupons.iter_mut().find(|c| &c.code == code) {
                coupon.record_use();
                if let Some(user_id) = order.user_id() {
                    grants.iter_mut()
                        .filter(|g| g.user_id == user_id && g.coupon_id == coupon.id)
                        .for_each(|g| g.is_used = true);
                }
            }
        }
        *current = stored(&order);
        Ok(Some(SettlementRecord { order, effect, redeemed_coupon }))
    }

    async fn transition_order(&self, id: Uuid, target: OrderStatus) -> Result<Order> {
        let mut state = self.state.write().await;
        let current = state.orders.iter_mut().find(|o| o.id() == id)
            .ok_or_else(|| StorefrontError::NotFound(format!("order {}", id)))?;
        let mut order = current.clone();
        if order.transition_to(target)? {
            *current = stored(&order);
        }
        Ok(order)
    }

    async fn list_orders(&self, status: Option<OrderStatus>, page: PageRequest) -> Result<Page<Order>> {
        let state = self.state.read().await;
        let mut matching: Vec<&Order> = state.orders.iter().filter(|o| status.map_or(true, |s| o.status() == s)).collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        let total = matching.len() as u64;
        let items = matching.into_iter().skip(page.offset() as usize).take(page.limit as usize).cloned().collect();
        Ok(Page::new(items, total, page))
    }

    async fn sales_summary(&self) -> Result<SalesSummary> {
        let state = self.state.read().await;
        let paid: Vec<&Order> = state.orders.iter().filter(|o| o.payment_status() == PaymentStatus::Paid).collect();

        let mut by_day: BTreeMap<chrono::NaiveDate, DailySales> = BTreeMap::new();
        for order in &paid {
            let day = order.created_at().date_naive();
            let entry = by_day.entry(day).or_insert(DailySales { day, orders: 0, revenue: Money::ZERO, discounts: Money::ZERO });
            entry.orders += 1;
            entry.revenue = entry.revenue + order.total();
            entry.discounts = entry.discounts + order.totals().discount;
        }
        let daily = by_day.into_values().rev().take(SALES_HISTORY_DAYS).collect();
        let revenue = paid.iter().map(|o| o.total()).sum();
        let discounts = paid.iter().map(|o| o.totals().discount).sum();
        Ok(SalesSummary::new(paid.len() as u64, revenue, discounts, daily))
    }
}
