//! Persistence boundary.
//!
//! Every method on [`Store`] is one transaction. Multi-row changes (checkout,
//! cancellation with restock) either commit completely or not at all, and the
//! stock check-then-decrement is serialized per product row by the backend.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{
    Address, CartError, CartLine, CartView, CheckoutError, Order, OrderError, OrderStatus, OrderWithOwner, Product,
    ProductFilter, ProductPatch, Review, Transition, TransitionPolicy, User,
};
use crate::domain::value_objects::{MoneyError, Quantity, Rating, Role};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    #[error("not found")]
    NotFound,

    /// Deleting the row would orphan existing orders.
    #[error("{entity} {id} is referenced by existing orders")]
    Referenced { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Cart(#[from] CartError),

    /// A computed amount left the storable range.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Result of a committed checkout.
#[derive(Clone, Debug)]
pub struct Placed {
    pub order: Order,
    /// Products whose stock reached zero in this checkout.
    pub depleted: Vec<Uuid>,
}

/// Result of a review submission.
#[derive(Clone, Debug)]
pub struct SavedReview {
    pub review: Review,
    pub created: bool,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Users -----------------------------------------------------------------

    /// Creates the user on first sight of `email`, otherwise returns the
    /// existing row. Never changes the stored role.
    async fn upsert_user(&self, email: &str, name: Option<String>) -> Result<User, StoreError>;
    async fn user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, StoreError>;

    // Addresses -------------------------------------------------------------

    async fn addresses(&self, user_id: Uuid) -> Result<Vec<Address>, StoreError>;
    async fn address(&self, id: Uuid) -> Result<Option<Address>, StoreError>;
    async fn insert_address(&self, address: &Address) -> Result<(), StoreError>;
    /// Fails with [`StoreError::Referenced`] if an order ships to it.
    async fn delete_address(&self, id: Uuid) -> Result<bool, StoreError>;

    // Catalog ---------------------------------------------------------------

    async fn products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;
    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Option<Product>, StoreError>;
    /// Fails with [`StoreError::Referenced`] if any order item points at it.
    /// Cart lines for the product are dropped with it.
    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError>;

    // Cart ------------------------------------------------------------------

    /// The user's cart with every line priced at current catalog values.
    async fn cart(&self, user_id: Uuid) -> Result<CartView, StoreError>;
    /// [`StoreError::NotFound`] if the product does not exist.
    async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, qty: Quantity) -> Result<CartLine, StoreError>;
    /// Owner of the cart a line sits in.
    async fn cart_line_owner(&self, line_id: Uuid) -> Result<Option<Uuid>, StoreError>;
    /// Rejects quantities above the product's current stock.
    async fn set_cart_quantity(&self, line_id: Uuid, qty: Quantity) -> Result<CartLine, StoreError>;
    async fn remove_cart_line(&self, line_id: Uuid) -> Result<bool, StoreError>;

    // Orders ----------------------------------------------------------------

    /// Converts the user's cart into a PENDING order, decrementing stock and
    /// clearing the cart atomically.
    async fn checkout(&self, user_id: Uuid, address_id: Uuid) -> Result<Placed, StoreError>;
    /// Newest first. `Some(user)` limits to that user's orders; `None` returns
    /// every order with its owner attached.
    async fn orders(&self, owner: Option<Uuid>) -> Result<Vec<OrderWithOwner>, StoreError>;
    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn transition_order(
        &self,
        id: Uuid,
        target: OrderStatus,
        policy: TransitionPolicy,
    ) -> Result<(Order, Transition), StoreError>;

    // Reviews ---------------------------------------------------------------

    async fn has_delivered_purchase(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError>;
    /// Inserts, or updates the existing review for (user, product) in place.
    async fn upsert_review(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        rating: Rating,
        comment: Option<String>,
    ) -> Result<SavedReview, StoreError>;
    async fn reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError>;
}
