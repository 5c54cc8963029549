//! Review Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::order::{Order, OrderStatus};
use crate::domain::value_objects::Rating;

/// At most one per (user, product); resubmitting edits it in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub rating: Rating,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn create(user_id: Uuid, product_id: Uuid, rating: Rating, comment: Option<String>) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), user_id, product_id, rating, comment, created_at: now, updated_at: now }
    }

    pub fn revise(&mut self, rating: Rating, comment: Option<String>) {
        self.rating = rating;
        self.comment = comment;
        self.updated_at = Utc::now();
    }
}

/// Verified purchase: some DELIVERED order of `user_id` contains `product_id`.
pub fn can_review<'a>(user_id: Uuid, product_id: Uuid, orders: impl IntoIterator<Item = &'a Order>) -> bool {
    orders
        .into_iter()
        .any(|o| o.user_id == user_id && o.status == OrderStatus::Delivered && o.contains_product(product_id))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("only customers can submit reviews")]
    NotCustomer,
    #[error("rating must be between 1 and 5")]
    InvalidRating,
    #[error("product has not been delivered to this customer")]
    NotPurchased,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::{CartLine, PricedLine};
    use crate::domain::aggregates::order::{Checkout, TransitionPolicy};
    use crate::domain::aggregates::product::{NewProduct, Product};
    use crate::domain::aggregates::user::{Address, NewAddress};
    use crate::domain::value_objects::{Category, Quantity};

    fn order_for(user: Uuid, product: &Product) -> Order {
        let addr = Address::create(user, NewAddress {
            street: "2 High St".into(), city: "Abuja".into(), state: "FC".into(),
            postal_code: "900001".into(), country: "NG".into(), is_default: false,
        });
        let line = PricedLine {
            line: CartLine { id: Uuid::now_v7(), cart_id: Uuid::nil(), product_id: product.id, quantity: Quantity::new(1).unwrap() },
            product: product.clone(),
        };
        Checkout::plan(user, Some(&addr), &[line]).unwrap()
    }

    #[test]
    fn test_only_delivered_orders_count() {
        let user = Uuid::now_v7();
        let product = Product::create(NewProduct { name: "Book".into(), description: String::new(), price: "8".parse().unwrap(), stock: 3, category: Category::Books });
        let mut order = order_for(user, &product);

        assert!(!can_review(user, product.id, [&order]));
        order.transition(OrderStatus::Shipped, TransitionPolicy::default()).unwrap();
        assert!(!can_review(user, product.id, [&order]));
        order.transition(OrderStatus::Delivered, TransitionPolicy::default()).unwrap();
        assert!(can_review(user, product.id, [&order]));

        assert!(!can_review(Uuid::now_v7(), product.id, [&order]));
        assert!(!can_review(user, Uuid::now_v7(), [&order]));
    }

    #[test]
    fn test_revise_keeps_identity() {
        let mut r = Review::create(Uuid::now_v7(), Uuid::now_v7(), Rating::new(3).unwrap(), None);
        let id = r.id;
        r.revise(Rating::new(5).unwrap(), Some("better on reread".into()));
        assert_eq!(r.id, id);
        assert_eq!(r.rating.value(), 5);
        assert!(r.updated_at >= r.created_at);
    }
}
