//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderPlaced { order_id: Uuid, user_id: Uuid, total: Decimal, items: usize },
    OrderStatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus, restocked: bool },
    StockDepleted { product_id: Uuid },
    ReviewSubmitted { review_id: Uuid, product_id: Uuid, rating: u8, updated: bool },
}

impl DomainEvent {
    /// Subject suffix used when publishing to the event bus.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::OrderPlaced { .. } => "order.placed",
            DomainEvent::OrderStatusChanged { .. } => "order.status_changed",
            DomainEvent::StockDepleted { .. } => "product.stock_depleted",
            DomainEvent::ReviewSubmitted { .. } => "review.submitted",
        }
    }
}
