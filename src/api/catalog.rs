//! Products and reviews.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use super::extract::{ApiQuery, CurrentUser, IdPath, ValidJson};
use super::AppState;
use crate::domain::aggregates::{NewProduct, Product, ProductFilter, ProductPatch, Review};
use crate::domain::value_objects::{Category, Money};
use crate::error::{AppError, Result};
use crate::service::ProductDetail;

pub async fn list_products(State(s): State<AppState>, ApiQuery(filter): ApiQuery<ProductFilter>) -> Result<Json<Vec<Product>>> {
    Ok(Json(s.shop.products(&filter).await?))
}

pub async fn get_product(State(s): State<AppState>, IdPath(id): IdPath) -> Result<Json<ProductDetail>> {
    Ok(Json(s.shop.product(id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    pub price: Money,
    #[validate(range(max = 2147483647))]
    pub stock: u32,
    pub category: Category,
}

pub async fn create_product(
    State(s): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ValidJson(r): ValidJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    let new = NewProduct { name: r.name, description: r.description, price: r.price, stock: r.stock, category: r.category };
    Ok((StatusCode::CREATED, Json(s.shop.create_product(&caller, new).await?)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub price: Option<Money>,
    #[validate(range(max = 2147483647))]
    pub stock: Option<u32>,
    pub category: Option<Category>,
}

pub async fn update_product(
    State(s): State<AppState>,
    CurrentUser(caller): CurrentUser,
    IdPath(id): IdPath,
    ValidJson(r): ValidJson<UpdateProductRequest>,
) -> Result<Json<Product>> {
    let patch = ProductPatch { name: r.name, description: r.description, price: r.price, stock: r.stock, category: r.category };
    Ok(Json(s.shop.update_product(&caller, id, patch).await?))
}

pub async fn delete_product(State(s): State<AppState>, CurrentUser(caller): CurrentUser, IdPath(id): IdPath) -> Result<Json<Value>> {
    s.shop.delete_product(&caller, id).await?;
    Ok(Json(json!({ "id": id, "deleted": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsQuery { pub product_id: Option<Uuid> }

pub async fn list_reviews(State(s): State<AppState>, ApiQuery(q): ApiQuery<ReviewsQuery>) -> Result<Json<Vec<Review>>> {
    let product_id = q.product_id.ok_or_else(|| AppError::validation("productId is required"))?;
    Ok(Json(s.shop.reviews(product_id).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub product_id: Uuid,
    pub rating: i64,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

/// 201 for a first review, 200 when it replaced the caller's earlier one.
pub async fn submit_review(
    State(s): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ValidJson(r): ValidJson<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let saved = s.shop.submit_review(&caller, r.product_id, r.rating, r.comment).await?;
    let status = if saved.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(saved.review)))
}
