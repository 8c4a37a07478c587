//! PostgreSQL adapter.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use crate::domain::aggregates::{
    Coupon, Customer, LineItem, Order, OrderError, OrderStatus, Product, Settlement, SettlementEffect, ShippingAddress,
};
use crate::domain::pricing::Totals;
use crate::domain::value_objects::{CouponCode, Money};
use crate::{Result, StorefrontError};
use super::{
    CouponRepository, DailySales, OrderRepository, Page, PageRequest, ProductFilter, ProductRepository,
    SalesSummary, SettlementRecord, SALES_HISTORY_DAYS,
};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone, Debug)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, slug: String, name: String, description: String, price: Decimal, compare_at_price: Option<Decimal>,
    category: Option<String>, stock: i32, images: Vec<String>, is_active: bool,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Self {
            id: r.id, slug: r.slug, name: r.name, description: r.description,
            price: r.price.into(), compare_at_price: r.compare_at_price.map(Money::new),
            category: r.category, stock: u32::try_from(r.stock).unwrap_or(0), images: r.images,
            is_active: r.is_active, created_at: r.created_at, updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid, code: String, discount_type: String, discount_value: Decimal, min_purchase: Option<Decimal>,
    max_uses: Option<i32>, times_used: i32, expires_at: Option<DateTime<Utc>>, is_active: bool, created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StorefrontError;
    fn try_from(r: CouponRow) -> Result<Self> {
        Ok(Self {
            id: r.id,
            code: CouponCode::new(r.code).map_err(|e| StorefrontError::Internal(format!("stored coupon code: {}", e)))?,
            discount_type: r.discount_type.parse().map_err(StorefrontError::Internal)?,
            discount_value: r.discount_value,
            min_purchase: r.min_purchase.map(Money::new),
            max_uses: r.max_uses.map(|m| u32::try_from(m).unwrap_or(0)),
            times_used: u32::try_from(r.times_used).unwrap_or(0),
            expires_at: r.expires_at, is_active: r.is_active, created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, user_id: Option<Uuid>,
    customer_name: String, customer_email: String, customer_phone: String,
    shipping_address: String, shipping_city: String, shipping_state: String, shipping_zip: String,
    items: Json<Vec<LineItem>>,
    subtotal: Decimal, discount_amount: Decimal, shipping: Decimal, tax: Decimal, total: Decimal,
    coupon_code: Option<String>, payment_method: String, payment_status: String, status: String,
    mp_payment_id: Option<String>, mp_status: Option<String>, mp_status_detail: Option<String>,
    coupon_redeemed: bool, notes: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StorefrontError;
    fn try_from(r: OrderRow) -> Result<Self> {
        Ok(Self {
            id: r.id, order_number: r.order_number, user_id: r.user_id,
            customer: Customer { name: r.customer_name, email: r.customer_email, phone: r.customer_phone },
            shipping_address: ShippingAddress { address: r.shipping_address, city: r.shipping_city, state: r.shipping_state, zip: r.shipping_zip },
            items: r.items.0,
            totals: Totals {
                subtotal: r.subtotal.into(), discount: r.discount_amount.into(), shipping: r.shipping.into(),
                tax: r.tax.into(), total: r.total.into(),
            },
            coupon_code: r.coupon_code.map(CouponCode::new).transpose()
                .map_err(|e| StorefrontError::Internal(format!("stored coupon code: {}", e)))?,
            payment_method: r.payment_method,
            payment_status: r.payment_status.parse().map_err(StorefrontError::Internal)?,
            status: r.status.parse().map_err(StorefrontError::Internal)?,
            mp_payment_id: r.mp_payment_id,
            mp_status: r.mp_status.map(Into::into),
            mp_status_detail: r.mp_status_detail,
            coupon_redeemed: r.coupon_redeemed,
            notes: r.notes, created_at: r.created_at, updated_at: r.updated_at,
            events: vec![],
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &ProductFilter) {
    qb.push(" WHERE is_active");
    if let Some(search) = &f.search {
        qb.push(" AND name ILIKE ").push_bind(format!("%{}%", escape_like(search)));
    }
    if !f.categories.is_empty() {
        qb.push(" AND category = ANY(").push_bind(f.categories.clone()).push(")");
    }
    if let Some(min) = f.min_price { qb.push(" AND price >= ").push_bind(min.amount()); }
    if let Some(max) = f.max_price { qb.push(" AND price <= ").push_bind(max.amount()); }
    if f.in_stock { qb.push(" AND stock > 0"); }
    if f.on_sale { qb.push(" AND compare_at_price IS NOT NULL AND compare_at_price > price"); }
}

// =============================================================================
// Repositories
// =============================================================================

#[async_trait]
impl ProductRepository for PgStore {
    async fn list_products(&self, filter: &ProductFilter, page: PageRequest) -> Result<Page<Product>> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new("SELECT * FROM products");
        push_product_filters(&mut select, filter);
        select.push(" ORDER BY name ASC LIMIT ").push_bind(i64::from(page.limit))
            .push(" OFFSET ").push_bind(page.offset() as i64);
        let rows: Vec<ProductRow> = select.build_query_as().fetch_all(&self.pool).await?;
        Ok(Page::new(rows.into_iter().map(Product::from).collect(), total.max(0) as u64, page))
    }

    async fn find_product_by_slug(&self, slug: &str) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE slug = $1 AND is_active")
            .bind(slug).fetch_optional(&self.pool).await?;
        Ok(row.map(Product::from))
    }

    async fn find_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn insert_product(&self, p: &Product) -> Result<()> {
        let result = sqlx::query("INSERT INTO products (id, slug, name, description, price, compare_at_price, category, stock, images, is_active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)")
            .bind(p.id).bind(&p.slug).bind(&p.name).bind(&p.description).bind(p.price.amount())
            .bind(p.compare_at_price.map(|m| m.amount())).bind(&p.category).bind(i32::try_from(p.stock).unwrap_or(i32::MAX))
            .bind(&p.images).bind(p.is_active).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorefrontError::Conflict(format!("product slug {} already exists", p.slug))),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_product(&self, p: &Product) -> Result<Option<Product>> {
        let result = sqlx::query_as::<_, ProductRow>("UPDATE products SET slug = $2, name = $3, description = $4, price = $5, compare_at_price = $6, category = $7, stock = $8, images = $9, is_active = $10, updated_at = $11 WHERE id = $1 RETURNING *")
            .bind(p.id).bind(&p.slug).bind(&p.name).bind(&p.description).bind(p.price.amount())
            .bind(p.compare_at_price.map(|m| m.amount())).bind(&p.category).bind(i32::try_from(p.stock).unwrap_or(i32::MAX))
            .bind(&p.images).bind(p.is_active).bind(p.updated_at)
            .fetch_optional(&self.pool).await;
        match result {
            Ok(row) => Ok(row.map(Product::from)),
            Err(e) if is_unique_violation(&e) => Err(StorefrontError::Conflict(format!("product slug {} already exists", p.slug))),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_product_active(&self, id: Uuid, active: bool) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("UPDATE products SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id).bind(active).fetch_optional(&self.pool).await?;
        Ok(row.map(Product::from))
    }
}

#[async_trait]
impl CouponRepository for PgStore {
    async fn find_coupon(&self, code: &CouponCode) -> Result<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1")
            .bind(code.as_str()).fetch_optional(&self.pool).await?
            .map(Coupon::try_from).transpose()
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY created_at DESC")
            .fetch_all(&self.pool).await?
            .into_iter().map(Coupon::try_from).collect()
    }

    async fn insert_coupon(&self, c: &Coupon) -> Result<()> {
        let result = sqlx::query("INSERT INTO coupons (id, code, discount_type, discount_value, min_purchase, max_uses, times_used, expires_at, is_active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
            .bind(c.id).bind(c.code.as_str()).bind(c.discount_type.as_str()).bind(c.discount_value)
            .bind(c.min_purchase.map(|m| m.amount())).bind(c.max_uses.map(|m| i32::try_from(m).unwrap_or(i32::MAX)))
            .bind(i32::try_from(c.times_used).unwrap_or(i32::MAX)).bind(c.expires_at).bind(c.is_active).bind(c.created_at)
            .execute(&self.pool).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorefrontError::Conflict(format!("coupon {} already exists", c.code))),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_coupon_active(&self, code: &CouponCode, active: bool) -> Result<Option<Coupon>> {
        sqlx::query_as::<_, CouponRow>("UPDATE coupons SET is_active = $2 WHERE code = $1 RETURNING *")
            .bind(code.as_str()).bind(active).fetch_optional(&self.pool).await?
            .map(Coupon::try_from).transpose()
    }

    async fn delete_coupon(&self, code: &CouponCode) -> Result<bool> {
        let result = sqlx::query("DELETE FROM coupons WHERE code = $1").bind(code.as_str()).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?
            .map(Order::try_from).transpose()
    }

    async fn insert_order(&self, o: &Order) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, customer_name, customer_email, customer_phone, \
             shipping_address, shipping_city, shipping_state, shipping_zip, items, subtotal, discount_amount, shipping, tax, total, \
             coupon_code, payment_method, payment_status, status, coupon_redeemed, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24) \
             ON CONFLICT (id) DO NOTHING")
            .bind(o.id).bind(&o.order_number).bind(o.user_id)
            .bind(&o.customer.name).bind(&o.customer.email).bind(&o.customer.phone)
            .bind(&o.shipping_address.address).bind(&o.shipping_address.city).bind(&o.shipping_address.state).bind(&o.shipping_address.zip)
            .bind(Json(&o.items))
            .bind(o.totals.subtotal.amount()).bind(o.totals.discount.amount()).bind(o.totals.shipping.amount())
            .bind(o.totals.tax.amount()).bind(o.totals.total.amount())
            .bind(o.coupon_code.as_ref().map(CouponCode::as_str)).bind(&o.payment_method)
            .bind(o.payment_status.as_str()).bind(o.status.as_str()).bind(o.coupon_redeemed).bind(&o.notes)
            .bind(o.created_at).bind(o.updated_at)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn replace_order(&self, o: &Order) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(o.id).fetch_optional(&mut *tx).await?
            .map(Order::try_from).transpose()?
            .ok_or_else(|| StorefrontError::NotFound(format!("order {}", o.id)))?;
        if current.is_locked() {
            return Err(OrderError::Locked { status: current.status(), payment_status: current.payment_status() }.into());
        }
        let row = sqlx::query_as::<_, OrderRow>(
            "UPDATE orders SET user_id = $2, customer_name = $3, customer_email = $4, customer_phone = $5, \
             shipping_address = $6, shipping_city = $7, shipping_state = $8, shipping_zip = $9, items = $10, \
             subtotal = $11, discount_amount = $12, shipping = $13, tax = $14, total = $15, \
             coupon_code = $16, payment_method = $17, notes = $18, updated_at = $19 WHERE id = $1 RETURNING *")
            .bind(o.id).bind(o.user_id)
            .bind(&o.customer.name).bind(&o.customer.email).bind(&o.customer.phone)
            .bind(&o.shipping_address.address).bind(&o.shipping_address.city).bind(&o.shipping_address.state).bind(&o.shipping_address.zip)
            .bind(Json(&o.items))
            .bind(o.totals.subtotal.amount()).bind(o.totals.discount.amount()).bind(o.totals.shipping.amount())
            .bind(o.totals.tax.amount()).bind(o.totals.total.amount())
            .bind(o.coupon_code.as_ref().map(CouponCode::as_str)).bind(&o.payment_method).bind(&o.notes).bind(o.updated_at)
            .fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Order::try_from(row)
    }

    async fn record_settlement(&self, id: Uuid, settlement: &Settlement) -> Result<Option<SettlementRecord>> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id).fetch_optional(&mut *tx).await?
        else {
            return Ok(None);
        };
        let mut order = Order::try_from(row)?;
        let effect = order.apply_settlement(settlement);
        if effect == SettlementEffect::IgnoredStale {
            tx.commit().await?;
            return Ok(Some(SettlementRecord { order, effect, redeemed_coupon: None }));
        }
        let redeemed_coupon = order.claim_coupon_redemption();

        sqlx::query("UPDATE orders SET payment_status = $2, status = $3, mp_payment_id = $4, mp_status = $5, mp_status_detail = $6, coupon_redeemed = $7, updated_at = $8 WHERE id = $1")
            .bind(id).bind(order.payment_status.as_str()).bind(order.status.as_str())
            .bind(&order.mp_payment_id).bind(order.mp_status.as_ref().map(|s| s.as_str().to_string()))
            .bind(&order.mp_status_detail).bind(order.coupon_redeemed).bind(order.updated_at)
            .execute(&mut *tx).await?;

        if let Some(code) = &redeemed_coupon {
            let coupon_id: Option<Uuid> = sqlx::query_scalar("UPDATE coupons SET times_used = times_used + 1 WHERE code = $1 RETURNING id")
                .bind(code.as_str()).fetch_optional(&mut *tx).await?;
            if let (Some(coupon_id), Some(user_id)) = (coupon_id, order.user_id) {
                sqlx::query("UPDATE user_coupons SET is_used = TRUE, used_at = NOW() WHERE user_id = $1 AND coupon_id = $2")
                    .bind(user_id).bind(coupon_id).execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;
        Ok(Some(SettlementRecord { order, effect, redeemed_coupon }))
    }

    async fn transition_order(&self, id: Uuid, target: OrderStatus) -> Result<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id).fetch_optional(&mut *tx).await?
            .map(Order::try_from).transpose()?
            .ok_or_else(|| StorefrontError::NotFound(format!("order {}", id)))?;
        if order.transition_to(target)? {
            sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(id).bind(order.status.as_str()).bind(order.updated_at)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(order)
    }

    async fn list_orders(&self, status: Option<OrderStatus>, page: PageRequest) -> Result<Page<Order>> {
        let status = status.map(|s| s.as_str());
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1)")
            .bind(status).fetch_one(&self.pool).await?;
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC LIMIT $2 OFFSET $3")
            .bind(status).bind(i64::from(page.limit)).bind(page.offset() as i64)
            .fetch_all(&self.pool).await?;
        let orders = rows.into_iter().map(Order::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(orders, total.max(0) as u64, page))
    }

    async fn sales_summary(&self) -> Result<SalesSummary> {
        let (orders, revenue, discounts): (i64, Decimal, Decimal) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total), 0), COALESCE(SUM(discount_amount), 0) FROM orders WHERE payment_status = 'paid'")
            .fetch_one(&self.pool).await?;
        let daily: Vec<(NaiveDate, i64, Decimal, Decimal)> = sqlx::query_as(
            "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*), SUM(total), SUM(discount_amount) \
             FROM orders WHERE payment_status = 'paid' GROUP BY day ORDER BY day DESC LIMIT $1")
            .bind(SALES_HISTORY_DAYS as i64)
            .fetch_all(&self.pool).await?;
        let daily = daily.into_iter()
            .map(|(day, orders, revenue, discounts)| DailySales { day, orders: orders.max(0) as u64, revenue: revenue.into(), discounts: discounts.into() })
            .collect();
        Ok(SalesSummary::new(orders.max(0) as u64, revenue.into(), discounts.into(), daily))
    }
}
