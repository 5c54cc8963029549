//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::{Money, MoneyError, Quantity};

/// One cart per user, created lazily on first access.
#[derive(Clone, Debug)]
pub struct Cart {
    id: Uuid,
    user_id: Uuid,
    lines: Vec<CartLine>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Quantity,
}

impl Cart {
    pub fn for_user(user_id: Uuid) -> Self {
        Self { id: Uuid::now_v7(), user_id, lines: vec![], updated_at: Utc::now() }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn line(&self, line_id: Uuid) -> Option<&CartLine> { self.lines.iter().find(|l| l.id == line_id) }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    /// Adds `qty` of a product. An existing line for the same product is
    /// incremented instead of duplicated. Stock is not checked here, but the
    /// merged quantity must stay within [`Quantity::MAX`].
    pub fn add(&mut self, product_id: Uuid, qty: Quantity) -> Result<&CartLine, CartError> {
        let idx = match self.lines.iter().position(|l| l.product_id == product_id) {
            Some(i) => {
                self.lines[i].quantity = self.lines[i].quantity.checked_add(qty).map_err(|_| CartError::QuantityOutOfRange)?;
                i
            }
            None => {
                self.lines.push(CartLine { id: Uuid::now_v7(), cart_id: self.id, product_id, quantity: qty });
                self.lines.len() - 1
            }
        };
        self.touch();
        Ok(&self.lines[idx])
    }

    /// Sets a line's quantity; the product must currently have that much stock.
    pub fn set_quantity(&mut self, line_id: Uuid, qty: Quantity, product: &Product) -> Result<&CartLine, CartError> {
        if !product.can_fulfil(qty) {
            return Err(CartError::ExceedsStock { product_id: product.id, requested: qty.value(), available: product.stock });
        }
        let line = self.lines.iter_mut().find(|l| l.id == line_id).ok_or(CartError::LineNotFound)?;
        line.quantity = qty;
        self.updated_at = Utc::now();
        self.line(line_id).ok_or(CartError::LineNotFound)
    }

    pub fn remove(&mut self, line_id: Uuid) -> Result<CartLine, CartError> {
        let idx = self.lines.iter().position(|l| l.id == line_id).ok_or(CartError::LineNotFound)?;
        let line = self.lines.remove(idx);
        self.touch();
        Ok(line)
    }

    pub fn remove_product(&mut self, product_id: Uuid) { self.lines.retain(|l| l.product_id != product_id); }

    pub fn clear(&mut self) { self.lines.clear(); self.touch(); }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// A cart line joined with the product it refers to, as read at one instant.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLine {
    #[serde(flatten)]
    pub line: CartLine,
    pub product: Product,
}

impl PricedLine {
    pub fn line_total(&self) -> Result<Money, MoneyError> { self.product.price.checked_mul(self.line.quantity) }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<PricedLine>,
    pub subtotal: Money,
}

impl CartView {
    pub fn new(id: Uuid, user_id: Uuid, items: Vec<PricedLine>) -> Result<Self, MoneyError> {
        let subtotal = items.iter().map(PricedLine::line_total).collect::<Result<Vec<_>, _>>().and_then(Money::total)?;
        Ok(Self { id, user_id, items, subtotal })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("cart item not found")]
    LineNotFound,
    #[error("only {available} in stock for product {product_id}, requested {requested}")]
    ExceedsStock { product_id: Uuid, requested: u32, available: u32 },
    #[error("cart quantity would exceed {}", Quantity::MAX)]
    QuantityOutOfRange,
}
