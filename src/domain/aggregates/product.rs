//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Category, Money, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by staff when creating a product.
#[derive(Clone, Debug)]
pub struct NewProduct { pub name: String, pub description: String, pub price: Money, pub stock: u32, pub category: Category }

/// Partial update; `None` leaves the field untouched.
#[derive(Clone, Debug, Default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub stock: Option<u32>,
    pub category: Option<Category>,
}

impl Product {
    /// Stock lives in an `INTEGER` column.
    pub const MAX_STOCK: u32 = Quantity::MAX;

    pub fn create(new: NewProduct) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: new.name, description: new.description,
            price: new.price, stock: new.stock, category: new.category,
            created_at: now, updated_at: now,
        }
    }

    pub fn is_in_stock(&self) -> bool { self.stock > 0 }
    pub fn can_fulfil(&self, qty: Quantity) -> bool { qty.value() <= self.stock }

    pub fn apply(&mut self, patch: ProductPatch) {
        if let Some(name) = patch.name { self.name = name; }
        if let Some(description) = patch.description { self.description = description; }
        if let Some(price) = patch.price { self.price = price; }
        if let Some(stock) = patch.stock { self.stock = stock; }
        if let Some(category) = patch.category { self.category = category; }
        self.touch();
    }

    /// Takes `qty` units out of stock. Refuses rather than going negative.
    pub fn remove_stock(&mut self, qty: Quantity) -> Result<(), ProductError> {
        self.stock = self.stock.checked_sub(qty.value()).ok_or(ProductError::InsufficientStock {
            product_id: self.id,
            requested: qty.value(),
            available: self.stock,
        })?;
        self.touch();
        Ok(())
    }

    /// Returns stock to the shelf, capped at [`Product::MAX_STOCK`].
    pub fn restock(&mut self, qty: Quantity) {
        self.stock = self.stock.saturating_add(qty.value()).min(Self::MAX_STOCK);
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Catalog filter. Matching is exact (category) or range (price); `search`
/// is a case-insensitive substring match on name and description.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<Category>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
}

impl ProductFilter {
    pub fn matches(&self, p: &Product) -> bool {
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            if !p.name.to_lowercase().contains(&term) && !p.description.to_lowercase().contains(&term) {
                return false;
            }
        }
        if self.category.is_some_and(|c| c != p.category) { return false; }
        if self.min_price.is_some_and(|min| p.price < min) { return false; }
        if self.max_price.is_some_and(|max| p.price > max) { return false; }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: Uuid, requested: u32, available: u32 },
}
