use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::extract::{CurrentUser, IdPath, ValidJson};
use super::AppState;
use crate::domain::aggregates::{Order, OrderWithOwner};
use crate::error::Result;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest { pub address_id: Uuid }

pub async fn place_order(
    State(s): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ValidJson(r): ValidJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    Ok((StatusCode::CREATED, Json(s.shop.place_order(&caller, r.address_id).await?)))
}

pub async fn list_orders(State(s): State<AppState>, CurrentUser(caller): CurrentUser) -> Result<Json<Vec<OrderWithOwner>>> {
    Ok(Json(s.shop.orders(&caller).await?))
}

pub async fn get_order(State(s): State<AppState>, CurrentUser(caller): CurrentUser, IdPath(id): IdPath) -> Result<Json<Order>> {
    Ok(Json(s.shop.order(&caller, id).await?))
}

/// `status` stays a plain string so unknown values surface as INVALID_STATUS.
#[derive(Debug, Deserialize, Validate)]
pub struct StatusRequest { pub status: String }

pub async fn update_status(
    State(s): State<AppState>,
    CurrentUser(caller): CurrentUser,
    IdPath(id): IdPath,
    ValidJson(r): ValidJson<StatusRequest>,
) -> Result<Json<Order>> {
    Ok(Json(s.shop.update_order_status(&caller, id, r.status.trim()).await?))
}
