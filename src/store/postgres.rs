//! PostgreSQL store.
//!
//! Checkout locks the product rows it touches (`FOR UPDATE`, in id order so
//! concurrent checkouts never deadlock) and then decrements with a guarded
//! `UPDATE ... WHERE stock >= qty`. The `stock >= 0` CHECK constraint backs
//! both.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use uuid::Uuid;

use super::{Placed, SavedReview, Store, StoreError};
use crate::domain::aggregates::{
    normalize_email, Address, CartError, CartLine, CartView, Checkout, CheckoutError, Order, OrderItem, OrderOwner, OrderStatus,
    OrderWithOwner, PricedLine, Product, ProductFilter, ProductPatch, Review, Transition, TransitionPolicy, User,
};
use crate::domain::value_objects::{Category, Money, Quantity, Rating, Role};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn ensure_cart(conn: &mut PgConnection, user_id: Uuid) -> Result<Uuid, StoreError> {
        let id = sqlx::query_scalar(
            "INSERT INTO carts (id, user_id, created_at, updated_at) VALUES ($1, $2, NOW(), NOW()) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .fetch_one(conn)
        .await?;
        Ok(id)
    }

    async fn order_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, StoreError> {
        let rows = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY id")
            .bind(order_ids)
            .fetch_all(&self.pool)
            .await?;
        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let item = OrderItem::try_from(row)?;
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

// =============================================================================
// Internal Row Types
// =============================================================================

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::DataCorruption(format!("{what}: {detail}"))
}

fn money(value: Decimal) -> Result<Money, StoreError> { Money::new(value).map_err(|e| corrupt("money", e)) }

fn quantity(value: i32) -> Result<Quantity, StoreError> {
    Quantity::try_from(i64::from(value)).map_err(|e| corrupt("quantity", e))
}

fn to_i32(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| corrupt("integer overflow", value))
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow { id: Uuid, email: String, name: Option<String>, role: String, created_at: DateTime<Utc> }

impl TryFrom<UserRow> for User {
    type Error = StoreError;
    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let role = Role::from_str(&r.role).map_err(|e| corrupt("role", e))?;
        Ok(User { id: r.id, email: r.email, name: r.name, role, created_at: r.created_at })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AddressRow { id: Uuid, user_id: Uuid, street: String, city: String, state: String, postal_code: String, country: String, is_default: bool }

impl From<AddressRow> for Address {
    fn from(r: AddressRow) -> Self {
        Address { id: r.id, user_id: r.user_id, street: r.street, city: r.city, state: r.state, postal_code: r.postal_code, country: r.country, is_default: r.is_default }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    price: Decimal,
    stock: i32,
    category: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: r.id,
            name: r.name,
            description: r.description,
            price: money(r.price)?,
            stock: u32::try_from(r.stock).map_err(|e| corrupt("stock", e))?,
            category: Category::from_str(&r.category).map_err(|e| corrupt("category", e))?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow { id: Uuid, cart_id: Uuid, product_id: Uuid, quantity: i32 }

impl TryFrom<CartLineRow> for CartLine {
    type Error = StoreError;
    fn try_from(r: CartLineRow) -> Result<Self, Self::Error> {
        Ok(CartLine { id: r.id, cart_id: r.cart_id, product_id: r.product_id, quantity: quantity(r.quantity)? })
    }
}

/// Cart line joined with its product.
#[derive(Debug, sqlx::FromRow)]
struct PricedLineRow {
    line_id: Uuid,
    cart_id: Uuid,
    quantity: i32,
    #[sqlx(flatten)]
    product: ProductRow,
}

impl TryFrom<PricedLineRow> for PricedLine {
    type Error = StoreError;
    fn try_from(r: PricedLineRow) -> Result<Self, Self::Error> {
        let product = Product::try_from(r.product)?;
        Ok(PricedLine {
            line: CartLine { id: r.line_id, cart_id: r.cart_id, product_id: product.id, quantity: quantity(r.quantity)? },
            product,
        })
    }
}

const PRICED_LINES: &str = "SELECT ci.id AS line_id, ci.cart_id, ci.quantity, p.id, p.name, p.description, p.price, \
     p.stock, p.category, p.created_at, p.updated_at \
     FROM cart_items ci JOIN products p ON p.id = ci.product_id WHERE ci.cart_id = $1";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    address_id: Uuid,
    status: String,
    total: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, StoreError> {
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            address_id: self.address_id,
            status: OrderStatus::from_str(&self.status).map_err(|e| corrupt("order status", e))?,
            total: money(self.total)?,
            items,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderOwnerRow {
    #[sqlx(flatten)]
    order: OrderRow,
    owner_email: String,
    owner_name: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow { id: Uuid, order_id: Uuid, product_id: Uuid, quantity: i32, price: Decimal }

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StoreError;
    fn try_from(r: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(OrderItem { id: r.id, order_id: r.order_id, product_id: r.product_id, quantity: quantity(r.quantity)?, price: money(r.price)? })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    rating: i16,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;
    fn try_from(r: ReviewRow) -> Result<Self, Self::Error> {
        let rating = Rating::new(i64::from(r.rating)).ok_or_else(|| corrupt("rating", r.rating))?;
        Ok(Review { id: r.id, user_id: r.user_id, product_id: r.product_id, rating, comment: r.comment, created_at: r.created_at, updated_at: r.updated_at })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UpsertedReviewRow {
    #[sqlx(flatten)]
    review: ReviewRow,
    inserted: bool,
}

// =============================================================================
// Store
// =============================================================================

#[async_trait]
impl Store for PgStore {
    async fn upsert_user(&self, email: &str, name: Option<String>) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, email, name, role, created_at) VALUES ($1, $2, $3, 'CUSTOMER', NOW()) \
             ON CONFLICT (email) DO UPDATE SET name = COALESCE(EXCLUDED.name, users.name) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(normalize_email(email))
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>("UPDATE users SET role = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn addresses(&self, user_id: Uuid) -> Result<Vec<Address>, StoreError> {
        let rows = sqlx::query_as::<_, AddressRow>("SELECT * FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Address::from).collect())
    }

    async fn address(&self, id: Uuid) -> Result<Option<Address>, StoreError> {
        let row = sqlx::query_as::<_, AddressRow>("SELECT * FROM addresses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Address::from))
    }

    async fn insert_address(&self, a: &Address) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO addresses (id, user_id, street, city, state, postal_code, country, is_default) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(a.id)
        .bind(a.user_id)
        .bind(&a.street)
        .bind(&a.city)
        .bind(&a.state)
        .bind(&a.postal_code)
        .bind(&a.country)
        .bind(a.is_default)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_address(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let used: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE address_id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if used { return Err(StoreError::Referenced { entity: "address", id }); }
        let done = sqlx::query("DELETE FROM addresses WHERE id = $1").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(done.rows_affected() > 0)
    }

    async fn products(&self, f: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let search = f.search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase);
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT * FROM products \
             WHERE ($1::text IS NULL OR strpos(lower(name), $1) > 0 OR strpos(lower(description), $1) > 0) \
               AND ($2::text IS NULL OR category = $2) \
               AND ($3::numeric IS NULL OR price >= $3) \
               AND ($4::numeric IS NULL OR price <= $4) \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(search)
        .bind(f.category.map(|c| c.as_str()))
        .bind(f.min_price.map(|m| m.amount()))
        .bind(f.max_price.map(|m| m.amount()))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn insert_product(&self, p: &Product) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO products (id, name, description, price, stock, category, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(&p.description)
        .bind(p.price.amount())
        .bind(to_i32(p.stock)?)
        .bind(p.category.as_str())
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Option<Product>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let mut product = Product::try_from(row)?;
        product.apply(patch);
        sqlx::query(
            "UPDATE products SET name = $2, description = $3, price = $4, stock = $5, category = $6, updated_at = $7 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(to_i32(product.stock)?)
        .bind(product.category.as_str())
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(product))
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let used: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_items WHERE product_id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if used { return Err(StoreError::Referenced { entity: "product", id }); }
        // cart_items and reviews cascade
        let done = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(done.rows_affected() > 0)
    }

    async fn cart(&self, user_id: Uuid) -> Result<CartView, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let cart_id = Self::ensure_cart(&mut conn, user_id).await?;
        let sql = format!("{PRICED_LINES} ORDER BY ci.id");
        let rows = sqlx::query_as::<_, PricedLineRow>(&sql)
            .bind(cart_id)
            .fetch_all(&mut *conn)
            .await?;
        let items = rows.into_iter().map(PricedLine::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(CartView::new(cart_id, user_id, items)?)
    }

    async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, qty: Quantity) -> Result<CartLine, StoreError> {
        let mut tx = self.pool.begin().await?;
        // Keeps the product from being deleted until the line is in place.
        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR SHARE")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() { return Err(StoreError::NotFound); }
        let cart_id = Self::ensure_cart(&mut tx, user_id).await?;
        // The merge runs in bigint so it can be refused instead of overflowing.
        let row = sqlx::query_as::<_, CartLineRow>(
            "INSERT INTO cart_items (id, cart_id, product_id, quantity) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity \
             WHERE cart_items.quantity::bigint + EXCLUDED.quantity <= $5 \
             RETURNING id, cart_id, product_id, quantity",
        )
        .bind(Uuid::now_v7())
        .bind(cart_id)
        .bind(product_id)
        .bind(to_i32(qty.value())?)
        .bind(i64::from(Quantity::MAX))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(CartError::QuantityOutOfRange)?;
        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1").bind(cart_id).execute(&mut *tx).await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn cart_line_owner(&self, line_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let owner = sqlx::query_scalar("SELECT c.user_id FROM cart_items ci JOIN carts c ON c.id = ci.cart_id WHERE ci.id = $1")
            .bind(line_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner)
    }

    async fn set_cart_quantity(&self, line_id: Uuid, qty: Quantity) -> Result<CartLine, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, PricedLineRow>(
            "SELECT ci.id AS line_id, ci.cart_id, ci.quantity, p.id, p.name, p.description, p.price, \
             p.stock, p.category, p.created_at, p.updated_at \
             FROM cart_items ci JOIN products p ON p.id = ci.product_id WHERE ci.id = $1 FOR UPDATE OF ci, p",
        )
        .bind(line_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        let priced = PricedLine::try_from(row)?;
        if !priced.product.can_fulfil(qty) {
            return Err(CartError::ExceedsStock {
                product_id: priced.product.id,
                requested: qty.value(),
                available: priced.product.stock,
            }
            .into());
        }
        sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
            .bind(line_id)
            .bind(to_i32(qty.value())?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(CartLine { quantity: qty, ..priced.line })
    }

    async fn remove_cart_line(&self, line_id: Uuid) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM cart_items WHERE id = $1").bind(line_id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn checkout(&self, user_id: Uuid, address_id: Uuid) -> Result<Placed, StoreError> {
        let mut tx = self.pool.begin().await?;

        let cart_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        let locking = format!("{PRICED_LINES} ORDER BY p.id FOR UPDATE OF p");
        let lines = match cart_id {
            Some(cart_id) => sqlx::query_as::<_, PricedLineRow>(&locking)
                .bind(cart_id)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .map(PricedLine::try_from)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let address = sqlx::query_as::<_, AddressRow>("SELECT * FROM addresses WHERE id = $1")
            .bind(address_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(Address::from);

        let order = Checkout::plan(user_id, address.as_ref(), &lines)?;

        sqlx::query(
            "INSERT INTO orders (id, user_id, address_id, status, total, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.address_id)
        .bind(order.status.as_str())
        .bind(order.total.amount())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        let mut depleted = Vec::new();
        for (item, line) in order.items.iter().zip(&lines) {
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, quantity, price) VALUES ($1, $2, $3, $4, $5)")
                .bind(item.id)
                .bind(item.order_id)
                .bind(item.product_id)
                .bind(to_i32(item.quantity.value())?)
                .bind(item.price.amount())
                .execute(&mut *tx)
                .await?;

            let remaining: Option<i32> = sqlx::query_scalar(
                "UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2 RETURNING stock",
            )
            .bind(item.product_id)
            .bind(to_i32(item.quantity.value())?)
            .fetch_optional(&mut *tx)
            .await?;
            match remaining {
                Some(0) => depleted.push(item.product_id),
                Some(_) => {}
                None => {
                    tx.rollback().await?;
                    return Err(CheckoutError::InsufficientStock {
                        product_id: item.product_id,
                        product_name: line.product.name.clone(),
                        requested: item.quantity.value(),
                        available: line.product.stock,
                    }
                    .into());
                }
            }
        }

        if let Some(cart_id) = cart_id {
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1").bind(cart_id).execute(&mut *tx).await?;
            sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1").bind(cart_id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(Placed { order, depleted })
    }

    async fn orders(&self, owner: Option<Uuid>) -> Result<Vec<OrderWithOwner>, StoreError> {
        let rows = sqlx::query_as::<_, OrderOwnerRow>(
            "SELECT o.*, u.email AS owner_email, u.name AS owner_name FROM orders o JOIN users u ON u.id = o.user_id \
             WHERE ($1::uuid IS NULL OR o.user_id = $1) ORDER BY o.created_at DESC, o.id DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.order.id).collect();
        let mut items = self.order_items(&ids).await?;
        rows.into_iter()
            .map(|r| {
                let user = owner.is_none().then(|| OrderOwner { id: r.order.user_id, email: r.owner_email, name: r.owner_name });
                let order_items = items.remove(&r.order.id).unwrap_or_default();
                let order = r.order.into_order(order_items)?;
                Ok(OrderWithOwner { order, user })
            })
            .collect()
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let Some(row) = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let items = self.order_items(&[id]).await?.remove(&id).unwrap_or_default();
        row.into_order(items).map(Some)
    }

    async fn transition_order(
        &self,
        id: Uuid,
        target: OrderStatus,
        policy: TransitionPolicy,
    ) -> Result<(Order, Transition), StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound)?;
        let items = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(OrderItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let mut order = row.into_order(items)?;
        let transition = order.transition(target, policy)?;

        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;
        if transition.restock {
            for item in &order.items {
                sqlx::query("UPDATE products SET stock = LEAST(stock::bigint + $2, $3), updated_at = NOW() WHERE id = $1")
                    .bind(item.product_id)
                    .bind(i64::from(item.quantity.value()))
                    .bind(i64::from(Product::MAX_STOCK))
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok((order, transition))
    }

    async fn has_delivered_purchase(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM order_items oi JOIN orders o ON o.id = oi.order_id \
             WHERE o.user_id = $1 AND oi.product_id = $2 AND o.status = 'DELIVERED')",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }

    async fn upsert_review(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        rating: Rating,
        comment: Option<String>,
    ) -> Result<SavedReview, StoreError> {
        if self.product(product_id).await?.is_none() { return Err(StoreError::NotFound); }
        let row = sqlx::query_as::<_, UpsertedReviewRow>(
            "INSERT INTO reviews (id, user_id, product_id, rating, comment, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW()) \
             ON CONFLICT (user_id, product_id) DO UPDATE \
             SET rating = EXCLUDED.rating, comment = EXCLUDED.comment, updated_at = NOW() \
             RETURNING *, (xmax = 0) AS inserted",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(product_id)
        .bind(i16::from(rating.value()))
        .bind(comment)
        .fetch_one(&self.pool)
        .await?;
        Ok(SavedReview { created: row.inserted, review: row.review.try_into()? })
    }

    async fn reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Review::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    //! Run against a scratch database: `TEST_DATABASE_URL=postgres://... cargo test`.
    use std::sync::Arc;

    use super::*;
    use crate::domain::aggregates::{NewAddress, NewProduct};

    async fn store() -> Option<PgStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let store = PgStore::connect(&url, 5).await.ok()?;
        store.migrate().await.ok()?;
        Some(store)
    }

    async fn buyer(store: &PgStore, product_id: Uuid, qty: u32) -> (Uuid, Uuid) {
        let user = store.upsert_user(&format!("{}@test.local", Uuid::now_v7()), None).await.unwrap();
        let addr = Address::create(user.id, NewAddress {
            street: "2 Race Road".into(), city: "Abuja".into(), state: "FC".into(),
            postal_code: "900001".into(), country: "NG".into(), is_default: true,
        });
        store.insert_address(&addr).await.unwrap();
        store.add_to_cart(user.id, product_id, Quantity::new(qty).unwrap()).await.unwrap();
        (user.id, addr.id)
    }

    async fn stocked(store: &PgStore, stock: u32) -> Product {
        let p = Product::create(NewProduct { name: "Drop".into(), description: String::new(), price: "1.00".parse().unwrap(), stock, category: Category::Other });
        store.insert_product(&p).await.unwrap();
        p
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checkouts_sell_exactly_the_stock() {
        let Some(store) = store().await else { return };
        let store = Arc::new(store);
        let p = stocked(&store, 3).await;
        let mut buyers = Vec::new();
        for _ in 0..8 {
            buyers.push(buyer(&store, p.id, 1).await);
        }

        let tasks: Vec<_> = buyers
            .iter()
            .map(|&(user_id, addr_id)| {
                let store = store.clone();
                tokio::spawn(async move { (user_id, store.checkout(user_id, addr_id).await) })
            })
            .collect();

        let mut placed = 0;
        for task in tasks {
            let (user_id, result) = task.await.unwrap();
            match result {
                Ok(_) => placed += 1,
                Err(err) => {
                    assert!(matches!(err, StoreError::Checkout(CheckoutError::InsufficientStock { .. })), "{err:?}");
                    assert_eq!(store.cart(user_id).await.unwrap().items.len(), 1);
                }
            }
        }
        assert_eq!(placed, 3);
        assert_eq!(store.product(p.id).await.unwrap().unwrap().stock, 0);
        let mut orders = 0;
        for (user_id, _) in &buyers {
            orders += store.orders(Some(*user_id)).await.unwrap().len();
        }
        assert_eq!(orders, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stock_edit_racing_checkout_is_serialized() {
        let Some(store) = store().await else { return };
        let store = Arc::new(store);
        let p = stocked(&store, 5).await;
        let (user_id, addr_id) = buyer(&store, p.id, 3).await;

        let edit = {
            let store = store.clone();
            tokio::spawn(async move {
                store.update_product(p.id, ProductPatch { stock: Some(1), ..Default::default() }).await
            })
        };
        let buy = {
            let store = store.clone();
            tokio::spawn(async move { store.checkout(user_id, addr_id).await })
        };
        edit.await.unwrap().unwrap().unwrap();
        let bought = buy.await.unwrap();

        // The edit wins last either way; the checkout only succeeds if it ran first.
        assert_eq!(store.product(p.id).await.unwrap().unwrap().stock, 1);
        let orders = store.orders(Some(user_id)).await.unwrap().len();
        match bought {
            Ok(_) => assert_eq!(orders, 1),
            Err(err) => {
                assert!(matches!(err, StoreError::Checkout(CheckoutError::InsufficientStock { .. })), "{err:?}");
                assert_eq!(orders, 0);
            }
        }
    }

    #[tokio::test]
    async fn test_cart_merge_past_integer_range_is_refused() {
        let Some(store) = store().await else { return };
        let p = stocked(&store, 1).await;
        let user = store.upsert_user(&format!("{}@test.local", Uuid::now_v7()), None).await.unwrap();
        store.add_to_cart(user.id, p.id, Quantity::new(Quantity::MAX).unwrap()).await.unwrap();
        let err = store.add_to_cart(user.id, p.id, Quantity::new(1).unwrap()).await.unwrap_err();
        assert!(matches!(err, StoreError::Cart(CartError::QuantityOutOfRange)), "{err:?}");
        assert_eq!(store.cart(user.id).await.unwrap().items[0].line.quantity.value(), Quantity::MAX);

        let err = store.add_to_cart(user.id, Uuid::now_v7(), Quantity::new(1).unwrap()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_checkout_decrements_and_clears() {
        let Some(store) = store().await else { return };
        let user = store.upsert_user(&format!("{}@test.local", Uuid::now_v7()), None).await.unwrap();
        let addr = Address::create(user.id, NewAddress {
            street: "1 Test Way".into(), city: "Lagos".into(), state: "LA".into(),
            postal_code: "100001".into(), country: "NG".into(), is_default: true,
        });
        store.insert_address(&addr).await.unwrap();
        let p = Product::create(NewProduct { name: "Kettle".into(), description: String::new(), price: "10.00".parse().unwrap(), stock: 1, category: Category::Other });
        store.insert_product(&p).await.unwrap();
        store.add_to_cart(user.id, p.id, Quantity::new(1).unwrap()).await.unwrap();

        let placed = store.checkout(user.id, addr.id).await.unwrap();
        assert_eq!(placed.order.total.to_string(), "10.00");
        assert_eq!(placed.depleted, vec![p.id]);
        assert_eq!(store.product(p.id).await.unwrap().unwrap().stock, 0);
        assert!(store.cart(user.id).await.unwrap().items.is_empty());

        store.add_to_cart(user.id, p.id, Quantity::new(1).unwrap()).await.unwrap();
        let err = store.checkout(user.id, addr.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Checkout(CheckoutError::InsufficientStock { .. })));
        assert_eq!(store.orders(Some(user.id)).await.unwrap().len(), 1);
    }
}
