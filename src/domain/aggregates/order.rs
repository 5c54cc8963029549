//! Order Aggregate
//!
//! Orders are only ever created by [`Checkout::plan`] from a priced cart. The
//! total and each item's price are frozen at that moment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::aggregates::cart::PricedLine;
use crate::domain::aggregates::user::Address;
use crate::domain::value_objects::{Money, Quantity, UnknownVariant};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub status: OrderStatus,
    pub total: Money,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Quantity,
    /// Unit price at the time the order was placed.
    pub price: Money,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] =
        [OrderStatus::Pending, OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled) }

    /// Next step on the happy path.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Processing),
            OrderStatus::Processing => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::Delivered),
            OrderStatus::Delivered | OrderStatus::Cancelled => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|st| st.as_str() == s).ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// How status changes are policed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Only allow the linear path plus cancellation from a non-terminal state.
    pub strict: bool,
    /// Return stock to the catalog when an order is cancelled.
    pub restock_on_cancel: bool,
}

impl Default for TransitionPolicy {
    fn default() -> Self { Self { strict: false, restock_on_cancel: true } }
}

/// Outcome of an accepted status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition { pub from: OrderStatus, pub to: OrderStatus, pub restock: bool }

impl Order {
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn contains_product(&self, product_id: Uuid) -> bool { self.items.iter().any(|i| i.product_id == product_id) }

    /// Moves the order to `target` under `policy`, bumping `updated_at`.
    pub fn transition(&mut self, target: OrderStatus, policy: TransitionPolicy) -> Result<Transition, OrderError> {
        let from = self.status;
        let rejected = || OrderError::InvalidTransition { from, to: target };

        // A restocked cancellation cannot be reopened without taking the stock again.
        if policy.restock_on_cancel && from == OrderStatus::Cancelled && target != OrderStatus::Cancelled {
            return Err(rejected());
        }
        if policy.strict {
            let allowed = from.next() == Some(target) || (target == OrderStatus::Cancelled && !from.is_terminal());
            if !allowed { return Err(rejected()); }
        }

        let restock = policy.restock_on_cancel && target == OrderStatus::Cancelled && from != OrderStatus::Cancelled;
        self.status = target;
        self.updated_at = Utc::now();
        Ok(Transition { from, to: target, restock })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

/// Converts a priced cart into a new order.
pub struct Checkout;

impl Checkout {
    /// Validates a cart snapshot and builds the order it would produce.
    ///
    /// Checks run in a fixed order (empty cart, address ownership, stock, total) and
    /// the first failure aborts the whole plan. Nothing is mutated here; the
    /// caller commits the returned order, the stock decrements and the cart
    /// clear in one transaction.
    pub fn plan(user_id: Uuid, address: Option<&Address>, lines: &[PricedLine]) -> Result<Order, CheckoutError> {
        if lines.is_empty() { return Err(CheckoutError::EmptyCart); }

        let address = address.filter(|a| a.is_owned_by(user_id)).ok_or(CheckoutError::InvalidAddress)?;

        if let Some(short) = lines.iter().find(|l| !l.product.can_fulfil(l.line.quantity)) {
            return Err(CheckoutError::InsufficientStock {
                product_id: short.product.id,
                product_name: short.product.name.clone(),
                requested: short.line.quantity.value(),
                available: short.product.stock,
            });
        }

        let total = lines
            .iter()
            .map(PricedLine::line_total)
            .collect::<Result<Vec<_>, _>>()
            .and_then(Money::total)
            .map_err(|_| CheckoutError::TotalOutOfRange)?;

        let id = Uuid::now_v7();
        let now = Utc::now();
        let items = lines
            .iter()
            .map(|l| OrderItem { id: Uuid::now_v7(), order_id: id, product_id: l.product.id, quantity: l.line.quantity, price: l.product.price })
            .collect();

        Ok(Order {
            id, user_id, address_id: address.id, status: OrderStatus::Pending,
            total, items, created_at: now, updated_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("address does not belong to the caller")]
    InvalidAddress,
    #[error("insufficient stock for {product_name}: requested {requested}, available {available}")]
    InsufficientStock { product_id: Uuid, product_name: String, requested: u32, available: u32 },
    #[error("order total exceeds {}", Money::MAX)]
    TotalOutOfRange,
}

/// Order as shown to staff, with the owner attached.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithOwner {
    #[serde(flatten)]
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<OrderOwner>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOwner { pub id: Uuid, pub email: String, pub name: Option<String> }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::CartLine;
    use crate::domain::aggregates::product::{NewProduct, Product};
    use crate::domain::aggregates::user::NewAddress;
    use crate::domain::value_objects::Category;

    fn address(user_id: Uuid) -> Address {
        Address::create(user_id, NewAddress {
            street: "1 Main St".into(), city: "Lagos".into(), state: "LA".into(),
            postal_code: "100001".into(), country: "NG".into(), is_default: true,
        })
    }

    fn line(price: &str, stock: u32, qty: u32) -> PricedLine {
        let product = Product::create(NewProduct { name: format!("Item {price}"), description: String::new(), price: price.parse().unwrap(), stock, category: Category::Other });
        PricedLine {
            line: CartLine { id: Uuid::now_v7(), cart_id: Uuid::nil(), product_id: product.id, quantity: Quantity::new(qty).unwrap() },
            product,
        }
    }

    fn pending_order() -> Order {
        let user = Uuid::now_v7();
        Checkout::plan(user, Some(&address(user)), &[line("10.00", 1, 1)]).unwrap()
    }

    #[test]
    fn test_plan_prices_and_totals() {
        let user = Uuid::now_v7();
        let addr = address(user);
        let lines = [line("0.10", 10, 3), line("19.99", 5, 2)];
        let order = Checkout::plan(user, Some(&addr), &lines).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total.to_string(), "40.28");
        assert_eq!(order.address_id, addr.id);
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[1].price.to_string(), "19.99");
        assert!(order.items.iter().all(|i| i.order_id == order.id));
    }

    #[test]
    fn test_plan_rejects_in_order() {
        let user = Uuid::now_v7();
        let mine = address(user);
        let theirs = address(Uuid::now_v7());

        assert_eq!(Checkout::plan(user, Some(&mine), &[]), Err(CheckoutError::EmptyCart));
        assert_eq!(Checkout::plan(user, None, &[line("1", 0, 1)]), Err(CheckoutError::InvalidAddress));
        assert_eq!(Checkout::plan(user, Some(&theirs), &[line("1", 0, 1)]), Err(CheckoutError::InvalidAddress));

        let short = line("5", 1, 2);
        let err = Checkout::plan(user, Some(&mine), &[line("1", 9, 1), short.clone()]).unwrap_err();
        assert_eq!(err, CheckoutError::InsufficientStock { product_id: short.product.id, product_name: short.product.name, requested: 2, available: 1 });
    }

    #[test]
    fn test_plan_rejects_total_past_money_range() {
        let user = Uuid::now_v7();
        let lines = [line("9999999999.99", 5, 1), line("0.01", 5, 1)];
        assert_eq!(Checkout::plan(user, Some(&address(user)), &lines), Err(CheckoutError::TotalOutOfRange));
        let lines = [line("5000000000", 5, 2)];
        assert_eq!(Checkout::plan(user, Some(&address(user)), &lines), Err(CheckoutError::TotalOutOfRange));
    }

    #[test]
    fn test_loose_policy_allows_any_recognized_status() {
        let mut order = pending_order();
        let loose = TransitionPolicy { strict: false, restock_on_cancel: false };
        order.transition(OrderStatus::Delivered, loose).unwrap();
        order.transition(OrderStatus::Pending, loose).unwrap();
        order.transition(OrderStatus::Cancelled, loose).unwrap();
        let t = order.transition(OrderStatus::Shipped, loose).unwrap();
        assert_eq!(t, Transition { from: OrderStatus::Cancelled, to: OrderStatus::Shipped, restock: false });
    }

    #[test]
    fn test_strict_policy_walks_the_happy_path() {
        let mut order = pending_order();
        let strict = TransitionPolicy { strict: true, restock_on_cancel: true };
        assert!(order.transition(OrderStatus::Shipped, strict).is_err());
        for step in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            order.transition(step, strict).unwrap();
        }
        assert_eq!(
            order.transition(OrderStatus::Cancelled, strict),
            Err(OrderError::InvalidTransition { from: OrderStatus::Delivered, to: OrderStatus::Cancelled })
        );
    }

    #[test]
    fn test_cancel_restocks_once() {
        let mut order = pending_order();
        let policy = TransitionPolicy::default();
        let before = order.updated_at;
        assert!(order.transition(OrderStatus::Cancelled, policy).unwrap().restock);
        assert!(order.updated_at >= before);
        assert!(!order.transition(OrderStatus::Cancelled, policy).unwrap().restock);
        assert!(order.transition(OrderStatus::Pending, policy).is_err());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("SHIPPED".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert!("LOST".parse::<OrderStatus>().is_err());
        assert_eq!(OrderStatus::Shipped.next(), Some(OrderStatus::Delivered));
    }
}
