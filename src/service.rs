//! Storefront operations.
//!
//! Every authorization and validation check happens here, before the store is
//! asked to mutate anything. Domain events go out after the store commits.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::aggregates::{
    Address, Caller, CartLine, CartView, NewAddress, NewProduct, Order, OrderStatus, OrderWithOwner, Product,
    ProductFilter, ProductPatch, Review, ReviewError, TransitionPolicy, User,
};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{Quantity, Rating, Role};
use crate::error::{AppError, Result};
use crate::publisher::EventPublisher;
use crate::store::{SavedReview, Store};

/// Runtime answers to the open order-lifecycle questions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OrderPolicy {
    pub transitions: TransitionPolicy,
    /// Report another customer's order as missing instead of forbidden.
    pub hide_foreign_orders: bool,
}

/// A product with its reviews, newest first.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub reviews: Vec<Review>,
}

#[derive(Clone)]
pub struct Storefront {
    store: Arc<dyn Store>,
    events: EventPublisher,
    policy: OrderPolicy,
}

fn require_staff(caller: &Caller) -> Result<()> {
    if caller.role.is_staff() { Ok(()) } else { Err(AppError::forbidden("staff role required")) }
}

fn check_stock(stock: Option<u32>) -> Result<()> {
    match stock {
        Some(n) if n > Product::MAX_STOCK => Err(AppError::validation(format!("stock exceeds {}", Product::MAX_STOCK))),
        _ => Ok(()),
    }
}

impl Storefront {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher, policy: OrderPolicy) -> Self {
        Self { store, events, policy }
    }

    // Identity ----------------------------------------------------------------

    /// Called once per sign-in by the identity provider. Idempotent: the same
    /// email always resolves to the same user and role.
    pub async fn identify(&self, email: &str, name: Option<String>) -> Result<User> {
        let user = self.store.upsert_user(email, name).await?;
        info!(user_id = %user.id, role = %user.role, "identity resolved");
        Ok(user)
    }

    pub async fn user(&self, id: Uuid) -> Result<Option<User>> { Ok(self.store.user(id).await?) }

    /// Admin-only role assignment. There is no self-service path.
    pub async fn assign_role(&self, caller: &Caller, user_id: Uuid, role: Role) -> Result<User> {
        if caller.role != Role::Admin { return Err(AppError::forbidden("admin role required")); }
        let user = self.store.set_role(user_id, role).await?.ok_or_else(|| AppError::not_found("user not found"))?;
        info!(admin_id = %caller.user_id, user_id = %user.id, role = %role, "role assigned");
        Ok(user)
    }

    // Addresses ---------------------------------------------------------------

    pub async fn addresses(&self, caller: &Caller) -> Result<Vec<Address>> { Ok(self.store.addresses(caller.user_id).await?) }

    pub async fn add_address(&self, caller: &Caller, new: NewAddress) -> Result<Address> {
        let address = Address::create(caller.user_id, new);
        self.store.insert_address(&address).await?;
        Ok(address)
    }

    pub async fn delete_address(&self, caller: &Caller, id: Uuid) -> Result<()> {
        let address = self.store.address(id).await?.ok_or_else(|| AppError::not_found("address not found"))?;
        if !address.is_owned_by(caller.user_id) { return Err(AppError::forbidden("address belongs to another user")); }
        self.store.delete_address(id).await?;
        Ok(())
    }

    // Catalog -----------------------------------------------------------------

    pub async fn products(&self, filter: &ProductFilter) -> Result<Vec<Product>> { Ok(self.store.products(filter).await?) }

    pub async fn product(&self, id: Uuid) -> Result<ProductDetail> {
        let product = self.store.product(id).await?.ok_or_else(|| AppError::not_found("product not found"))?;
        let reviews = self.store.reviews(id).await?;
        Ok(ProductDetail { product, reviews })
    }

    pub async fn create_product(&self, caller: &Caller, new: NewProduct) -> Result<Product> {
        require_staff(caller)?;
        check_stock(Some(new.stock))?;
        let product = Product::create(new);
        self.store.insert_product(&product).await?;
        info!(product_id = %product.id, by = %caller.user_id, "product created");
        Ok(product)
    }

    pub async fn update_product(&self, caller: &Caller, id: Uuid, patch: ProductPatch) -> Result<Product> {
        require_staff(caller)?;
        check_stock(patch.stock)?;
        let product = self.store.update_product(id, patch).await?.ok_or_else(|| AppError::not_found("product not found"))?;
        info!(product_id = %id, price = %product.price, stock = product.stock, "product updated");
        Ok(product)
    }

    pub async fn delete_product(&self, caller: &Caller, id: Uuid) -> Result<()> {
        require_staff(caller)?;
        if !self.store.delete_product(id).await? { return Err(AppError::not_found("product not found")); }
        info!(product_id = %id, by = %caller.user_id, "product deleted");
        Ok(())
    }

    // Cart --------------------------------------------------------------------

    pub async fn cart(&self, caller: &Caller) -> Result<CartView> { Ok(self.store.cart(caller.user_id).await?) }

    pub async fn add_to_cart(&self, caller: &Caller, product_id: Uuid, qty: Quantity) -> Result<CartLine> {
        self.store.add_to_cart(caller.user_id, product_id, qty).await.map_err(|e| match e {
            crate::store::StoreError::NotFound => AppError::not_found("product not found"),
            other => other.into(),
        })
    }

    async fn owned_line(&self, caller: &Caller, line_id: Uuid) -> Result<()> {
        match self.store.cart_line_owner(line_id).await? {
            None => Err(AppError::not_found("cart item not found")),
            Some(owner) if owner != caller.user_id => Err(AppError::forbidden("cart item belongs to another user")),
            Some(_) => Ok(()),
        }
    }

    pub async fn update_cart_line(&self, caller: &Caller, line_id: Uuid, qty: Quantity) -> Result<CartLine> {
        self.owned_line(caller, line_id).await?;
        Ok(self.store.set_cart_quantity(line_id, qty).await?)
    }

    pub async fn remove_cart_line(&self, caller: &Caller, line_id: Uuid) -> Result<()> {
        self.owned_line(caller, line_id).await?;
        if !self.store.remove_cart_line(line_id).await? { return Err(AppError::not_found("cart item not found")); }
        Ok(())
    }

    // Orders ------------------------------------------------------------------

    /// Checkout: turns the caller's cart into a PENDING order.
    pub async fn place_order(&self, caller: &Caller, address_id: Uuid) -> Result<Order> {
        let placed = match self.store.checkout(caller.user_id, address_id).await {
            Ok(placed) => placed,
            Err(e) => {
                let err = AppError::from(e);
                if !err.status().is_server_error() {
                    warn!(user_id = %caller.user_id, code = err.code(), reason = %err, "checkout rejected");
                }
                return Err(err);
            }
        };
        let order = placed.order;
        info!(order_id = %order.id, user_id = %order.user_id, total = %order.total, items = order.items.len(), "order placed");

        self.events
            .publish(DomainEvent::OrderPlaced { order_id: order.id, user_id: order.user_id, total: order.total.amount(), items: order.items.len() })
            .await;
        for product_id in placed.depleted {
            self.events.publish(DomainEvent::StockDepleted { product_id }).await;
        }
        Ok(order)
    }

    /// Customers see their own orders; staff see all, with owners attached.
    pub async fn orders(&self, caller: &Caller) -> Result<Vec<OrderWithOwner>> {
        let scope = if caller.role.is_staff() { None } else { Some(caller.user_id) };
        Ok(self.store.orders(scope).await?)
    }

    pub async fn order(&self, caller: &Caller, id: Uuid) -> Result<Order> {
        let order = self.store.order(id).await?.ok_or_else(|| AppError::not_found("order not found"))?;
        if caller.role.is_staff() || order.user_id == caller.user_id {
            return Ok(order);
        }
        if self.policy.hide_foreign_orders {
            Err(AppError::not_found("order not found"))
        } else {
            Err(AppError::forbidden("order belongs to another user"))
        }
    }

    /// Staff-only status change. `status` is the raw value from the request.
    pub async fn update_order_status(&self, caller: &Caller, id: Uuid, status: &str) -> Result<Order> {
        require_staff(caller)?;
        let target: OrderStatus = status
            .parse()
            .map_err(|_| AppError::Validation { code: "INVALID_STATUS", message: format!("unknown order status `{status}`") })?;
        let (order, t) = self.store.transition_order(id, target, self.policy.transitions).await.map_err(|e| match e {
            crate::store::StoreError::NotFound => AppError::not_found("order not found"),
            other => other.into(),
        })?;
        info!(order_id = %id, from = %t.from, to = %t.to, restocked = t.restock, by = %caller.user_id, "order status changed");
        self.events
            .publish(DomainEvent::OrderStatusChanged { order_id: id, from: t.from, to: t.to, restocked: t.restock })
            .await;
        Ok(order)
    }

    // Reviews -----------------------------------------------------------------

    pub async fn can_review(&self, caller: &Caller, product_id: Uuid) -> Result<bool> {
        if caller.role != Role::Customer { return Ok(false); }
        Ok(self.store.has_delivered_purchase(caller.user_id, product_id).await?)
    }

    /// Creates the caller's review of a product, or revises the existing one.
    pub async fn submit_review(&self, caller: &Caller, product_id: Uuid, rating: i64, comment: Option<String>) -> Result<SavedReview> {
        if caller.role != Role::Customer { return Err(ReviewError::NotCustomer.into()); }
        let rating = Rating::new(rating).ok_or(ReviewError::InvalidRating)?;
        if self.store.product(product_id).await?.is_none() { return Err(AppError::not_found("product not found")); }
        if !self.store.has_delivered_purchase(caller.user_id, product_id).await? {
            return Err(ReviewError::NotPurchased.into());
        }
        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        let saved = self.store.upsert_review(caller.user_id, product_id, rating, comment).await?;
        info!(review_id = %saved.review.id, product_id = %product_id, rating = rating.value(), created = saved.created, "review saved");
        self.events
            .publish(DomainEvent::ReviewSubmitted {
                review_id: saved.review.id,
                product_id,
                rating: rating.value(),
                updated: !saved.created,
            })
            .await;
        Ok(saved)
    }

    pub async fn reviews(&self, product_id: Uuid) -> Result<Vec<Review>> { Ok(self.store.reviews(product_id).await?) }
}
