use axum::{extract::State, Json};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::extract::{CurrentUser, IdPath, ValidJson};
use super::AppState;
use crate::domain::aggregates::CartView;
use crate::domain::value_objects::Quantity;
use crate::error::Result;

pub async fn get_cart(State(s): State<AppState>, CurrentUser(caller): CurrentUser) -> Result<Json<CartView>> {
    Ok(Json(s.shop.cart(&caller).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: Option<Quantity>,
}

/// Adding a product already in the cart merges into its line.
pub async fn add_item(
    State(s): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ValidJson(r): ValidJson<AddItemRequest>,
) -> Result<Json<CartView>> {
    s.shop.add_to_cart(&caller, r.product_id, r.quantity.unwrap_or(Quantity::ONE)).await?;
    Ok(Json(s.shop.cart(&caller).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateItemRequest { pub quantity: Quantity }

pub async fn update_item(
    State(s): State<AppState>,
    CurrentUser(caller): CurrentUser,
    IdPath(id): IdPath,
    ValidJson(r): ValidJson<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    s.shop.update_cart_line(&caller, id, r.quantity).await?;
    Ok(Json(s.shop.cart(&caller).await?))
}

pub async fn remove_item(State(s): State<AppState>, CurrentUser(caller): CurrentUser, IdPath(id): IdPath) -> Result<Json<CartView>> {
    s.shop.remove_cart_line(&caller, id).await?;
    Ok(Json(s.shop.cart(&caller).await?))
}
