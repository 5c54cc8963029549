//! In-memory store.
//!
//! All state sits behind one async mutex, so each operation runs as a
//! serializable critical section. Used by tests and database-less dev runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Placed, SavedReview, Store, StoreError};
use crate::domain::aggregates::{
    can_review, normalize_email, Address, Cart, CartLine, CartView, Checkout, Order, OrderOwner, OrderStatus,
    OrderWithOwner, PricedLine, Product, ProductFilter, ProductPatch, Review, Transition, TransitionPolicy, User,
};
use crate::domain::value_objects::{Quantity, Rating, Role};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    addresses: HashMap<Uuid, Address>,
    products: HashMap<Uuid, Product>,
    /// Keyed by owning user.
    carts: HashMap<Uuid, Cart>,
    orders: Vec<Order>,
    reviews: Vec<Review>,
}

impl State {
    fn cart_mut(&mut self, user_id: Uuid) -> &mut Cart {
        self.carts.entry(user_id).or_insert_with(|| Cart::for_user(user_id))
    }

    fn priced(&self, cart: &Cart) -> Result<Vec<PricedLine>, StoreError> {
        cart.lines()
            .iter()
            .map(|line| {
                let product = self.products.get(&line.product_id).cloned().ok_or_else(|| {
                    StoreError::DataCorruption(format!("cart line {} points at missing product", line.id))
                })?;
                Ok(PricedLine { line: line.clone(), product })
            })
            .collect()
    }

    fn cart_with_line(&mut self, line_id: Uuid) -> Option<&mut Cart> {
        self.carts.values_mut().find(|c| c.line(line_id).is_some())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(&self, email: &str, name: Option<String>) -> Result<User, StoreError> {
        let mut st = self.state.lock().await;
        let email = normalize_email(email);
        if let Some(existing) = st.users.values_mut().find(|u| u.email == email) {
            if name.is_some() { existing.name = name; }
            return Ok(existing.clone());
        }
        let user = User::register(&email, name);
        st.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<User>, StoreError> {
        let mut st = self.state.lock().await;
        Ok(st.users.get_mut(&id).map(|u| {
            u.role = role;
            u.clone()
        }))
    }

    async fn addresses(&self, user_id: Uuid) -> Result<Vec<Address>, StoreError> {
        let st = self.state.lock().await;
        let mut out: Vec<_> = st.addresses.values().filter(|a| a.user_id == user_id).cloned().collect();
        out.sort_by_key(|a| (!a.is_default, a.id));
        Ok(out)
    }

    async fn address(&self, id: Uuid) -> Result<Option<Address>, StoreError> {
        Ok(self.state.lock().await.addresses.get(&id).cloned())
    }

    async fn insert_address(&self, address: &Address) -> Result<(), StoreError> {
        self.state.lock().await.addresses.insert(address.id, address.clone());
        Ok(())
    }

    async fn delete_address(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut st = self.state.lock().await;
        if st.orders.iter().any(|o| o.address_id == id) {
            return Err(StoreError::Referenced { entity: "address", id });
        }
        Ok(st.addresses.remove(&id).is_some())
    }

    async fn products(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let st = self.state.lock().await;
        let mut out: Vec<_> = st.products.values().filter(|p| filter.matches(p)).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.state.lock().await.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Option<Product>, StoreError> {
        let mut st = self.state.lock().await;
        Ok(st.products.get_mut(&id).map(|p| {
            p.apply(patch);
            p.clone()
        }))
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut st = self.state.lock().await;
        if st.orders.iter().any(|o| o.contains_product(id)) {
            return Err(StoreError::Referenced { entity: "product", id });
        }
        if st.products.remove(&id).is_none() { return Ok(false); }
        for cart in st.carts.values_mut() { cart.remove_product(id); }
        st.reviews.retain(|r| r.product_id != id);
        Ok(true)
    }

    async fn cart(&self, user_id: Uuid) -> Result<CartView, StoreError> {
        let mut st = self.state.lock().await;
        let cart = st.cart_mut(user_id).clone();
        let items = st.priced(&cart)?;
        Ok(CartView::new(cart.id(), user_id, items)?)
    }

    async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, qty: Quantity) -> Result<CartLine, StoreError> {
        let mut st = self.state.lock().await;
        if !st.products.contains_key(&product_id) { return Err(StoreError::NotFound); }
        Ok(st.cart_mut(user_id).add(product_id, qty)?.clone())
    }

    async fn cart_line_owner(&self, line_id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let st = self.state.lock().await;
        Ok(st.carts.values().find(|c| c.line(line_id).is_some()).map(Cart::user_id))
    }

    async fn set_cart_quantity(&self, line_id: Uuid, qty: Quantity) -> Result<CartLine, StoreError> {
        let mut st = self.state.lock().await;
        let product_id = st
            .carts
            .values()
            .find_map(|c| c.line(line_id))
            .map(|l| l.product_id)
            .ok_or(StoreError::NotFound)?;
        let product = st.products.get(&product_id).cloned().ok_or(StoreError::NotFound)?;
        let cart = st.cart_with_line(line_id).ok_or(StoreError::NotFound)?;
        Ok(cart.set_quantity(line_id, qty, &product)?.clone())
    }

    async fn remove_cart_line(&self, line_id: Uuid) -> Result<bool, StoreError> {
        let mut st = self.state.lock().await;
        Ok(match st.cart_with_line(line_id) {
            Some(cart) => cart.remove(line_id).is_ok(),
            None => false,
        })
    }

    async fn checkout(&self, user_id: Uuid, address_id: Uuid) -> Result<Placed, StoreError> {
        let mut st = self.state.lock().await;
        let cart = st.cart_mut(user_id).clone();
        let lines = st.priced(&cart)?;
        let order = Checkout::plan(user_id, st.addresses.get(&address_id), &lines)?;

        // Plan validated every line against current stock under the lock, so
        // the decrements below cannot fail halfway.
        let mut depleted = Vec::new();
        for item in &order.items {
            let product = st.products.get_mut(&item.product_id).ok_or(StoreError::NotFound)?;
            product.remove_stock(item.quantity).map_err(|e| StoreError::DataCorruption(e.to_string()))?;
            if !product.is_in_stock() { depleted.push(product.id); }
        }
        st.cart_mut(user_id).clear();
        st.orders.push(order.clone());
        Ok(Placed { order, depleted })
    }

    async fn orders(&self, owner: Option<Uuid>) -> Result<Vec<OrderWithOwner>, StoreError> {
        let st = self.state.lock().await;
        let mut out: Vec<_> = st
            .orders
            .iter()
            .filter(|o| owner.map_or(true, |uid| o.user_id == uid))
            .map(|o| OrderWithOwner {
                order: o.clone(),
                user: match owner {
                    Some(_) => None,
                    None => st.users.get(&o.user_id).map(|u| OrderOwner { id: u.id, email: u.email.clone(), name: u.name.clone() }),
                },
            })
            .collect();
        out.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at).then(b.order.id.cmp(&a.order.id)));
        Ok(out)
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn transition_order(
        &self,
        id: Uuid,
        target: OrderStatus,
        policy: TransitionPolicy,
    ) -> Result<(Order, Transition), StoreError> {
        let mut st = self.state.lock().await;
        let idx = st.orders.iter().position(|o| o.id == id).ok_or(StoreError::NotFound)?;
        let mut order = st.orders[idx].clone();
        let transition = order.transition(target, policy)?;
        if transition.restock {
            for item in &order.items {
                if let Some(p) = st.products.get_mut(&item.product_id) { p.restock(item.quantity); }
            }
        }
        st.orders[idx] = order.clone();
        Ok((order, transition))
    }

    async fn has_delivered_purchase(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        Ok(can_review(user_id, product_id, &self.state.lock().await.orders))
    }

    async fn upsert_review(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        rating: Rating,
        comment: Option<String>,
    ) -> Result<SavedReview, StoreError> {
        let mut st = self.state.lock().await;
        if !st.products.contains_key(&product_id) { return Err(StoreError::NotFound); }
        if let Some(existing) = st.reviews.iter_mut().find(|r| r.user_id == user_id && r.product_id == product_id) {
            existing.revise(rating, comment);
            return Ok(SavedReview { review: existing.clone(), created: false });
        }
        let review = Review::create(user_id, product_id, rating, comment);
        st.reviews.push(review.clone());
        Ok(SavedReview { review, created: true })
    }

    async fn reviews(&self, product_id: Uuid) -> Result<Vec<Review>, StoreError> {
        let st = self.state.lock().await;
        let mut out: Vec<_> = st.reviews.iter().filter(|r| r.product_id == product_id).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}
