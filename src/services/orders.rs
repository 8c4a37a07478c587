//! Order lifecycle: quoting, idempotent creation, admin transitions and reporting.

use std::collections::HashMap;
use std::sync::Arc;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use crate::domain::aggregates::{Cart, Coupon, CouponRejection, LineItem, Order, OrderDraft, OrderStatus, ProductError};
use crate::domain::pricing::{PricingEngine, Totals};
use crate::domain::value_objects::{CouponCode, Quantity};
use crate::messaging::EventBus;
use crate::persistence::{CouponRepository, OrderRepository, Page, PageRequest, ProductRepository, SalesSummary};
use crate::{Result, StorefrontError};

/// Priced cart, before any order exists.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub items: Vec<LineItem>,
    #[serde(flatten)]
    pub totals: Totals,
    pub coupon_code: Option<CouponCode>,
}

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductRepository>,
    coupons: Arc<dyn CouponRepository>,
    pricing: PricingEngine,
    events: EventBus,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductRepository>,
        coupons: Arc<dyn CouponRepository>,
        pricing: PricingEngine,
        events: EventBus,
    ) -> Self {
        Self { orders, products, coupons, pricing, events }
    }

    pub async fn quote(&self, cart: &Cart, coupon_code: Option<&CouponCode>) -> Result<Quote> {
        let (items, totals) = self.price(cart, coupon_code).await?;
        Ok(Quote { items, totals, coupon_code: coupon_code.cloned() })
    }

    /// Creates the order identified by the client-chosen `id`, or returns the one a
    /// previous submission created. The flag is `true` only for a fresh insert.
    ///
    /// A resubmission with different contents replaces the stored order while it is
    /// still unlocked and is refused with a conflict afterwards.
    #[instrument(skip(self, draft), fields(order_id = %id))]
    pub async fn place_order(&self, id: Uuid, draft: OrderDraft) -> Result<(Order, bool)> {
        if let Some(existing) = self.orders.find_order(id).await? {
            return self.resubmit(existing, draft).await.map(|order| (order, false));
        }

        let (items, totals) = self.price(&draft.cart, draft.coupon_code.as_ref()).await?;
        let mut order = Order::place(id, draft.clone(), items, totals);
        if self.orders.insert_order(&order).await? {
            info!(order_number = order.order_number(), total = %order.total(), "order created");
            self.events.publish_all(order.take_events()).await;
            return Ok((order, true));
        }

        // a concurrent submission with the same id inserted first
        let existing = self.orders.find_order(id).await?
            .ok_or_else(|| StorefrontError::Internal(format!("order {} vanished after insert conflict", id)))?;
        self.resubmit(existing, draft).await.map(|order| (order, false))
    }

    async fn resubmit(&self, existing: Order, draft: OrderDraft) -> Result<Order> {
        if existing.matches(&draft) {
            debug!(order_id = %existing.id(), "order resubmitted unchanged");
            return Ok(existing);
        }
        if existing.is_locked() {
            warn!(order_id = %existing.id(), status = %existing.status(), payment_status = %existing.payment_status(), "refusing to change locked order");
            return Err(StorefrontError::Conflict(format!(
                "order {} is {} with payment {} and can no longer be changed",
                existing.id(), existing.status(), existing.payment_status(),
            )));
        }
        let (items, totals) = self.price(&draft.cart, draft.coupon_code.as_ref()).await?;
        let mut replacement = existing;
        replacement.replace(draft, items, totals)?;
        let order = self.orders.replace_order(&replacement).await?;
        info!(order_id = %order.id(), total = %order.total(), "order replaced before payment");
        Ok(order)
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order> {
        self.orders.find_order(id).await?.ok_or_else(|| StorefrontError::NotFound(format!("order {}", id)))
    }

    pub async fn list_orders(&self, status: Option<OrderStatus>, page: PageRequest) -> Result<Page<Order>> {
        self.orders.list_orders(status, page).await
    }

    #[instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<Order> {
        let mut order = self.orders.transition_order(id, status).await?;
        let events = order.take_events();
        if !events.is_empty() {
            info!(order_id = %id, status = %status, "order status changed");
        }
        self.events.publish_all(events).await;
        Ok(order)
    }

    pub async fn sales_summary(&self) -> Result<SalesSummary> { self.orders.sales_summary().await }

    async fn price(&self, cart: &Cart, coupon_code: Option<&CouponCode>) -> Result<(Vec<LineItem>, Totals)> {
        let items = self.price_lines(cart).await?;
        let coupon = self.load_coupon(coupon_code).await?;
        let totals = self.pricing.compute_totals(&items, coupon.as_ref(), Utc::now())?;
        Ok((items, totals))
    }

    /// Freezes current catalog names and prices into line items, checking stock
    /// against the total quantity requested per product.
    async fn price_lines(&self, cart: &Cart) -> Result<Vec<LineItem>> {
        if cart.is_empty() { return Err(StorefrontError::EmptyCart); }
        let products: HashMap<Uuid, _> = self.products.find_products(&cart.product_ids()).await?
            .into_iter().map(|p| (p.id, p)).collect();

        let mut requested: HashMap<Uuid, u32> = HashMap::new();
        for item in cart.items() {
            let total = requested.entry(item.product_id).or_default();
            *total = total.saturating_add(item.quantity.value());
        }

        cart.items().iter().map(|item| -> Result<LineItem> {
            let product = products.get(&item.product_id)
                .ok_or(ProductError::Unavailable { product_id: item.product_id })?;
            let wanted = requested.get(&item.product_id).copied().and_then(Quantity::new).unwrap_or(item.quantity);
            product.ensure_available(wanted)?;
            Ok(LineItem {
                product_id: product.id,
                variant: item.variant.clone(),
                name: product.name.clone(),
                unit_price: product.price,
                quantity: item.quantity,
            })
        }).collect()
    }

    async fn load_coupon(&self, code: Option<&CouponCode>) -> Result<Option<Coupon>> {
        let Some(code) = code else { return Ok(None) };
        match self.coupons.find_coupon(code).await? {
            Some(coupon) => Ok(Some(coupon)),
            None => Err(CouponRejection::NotFound { code: code.to_string() }.into()),
        }
    }
}
