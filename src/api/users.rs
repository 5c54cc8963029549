use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use validator::Validate;

use super::extract::{CurrentUser, IdPath, ValidJson};
use super::AppState;
use crate::domain::aggregates::{Address, NewAddress, User};
use crate::domain::value_objects::Role;
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct IdentityRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
}

/// Called by the identity provider once per sign-in.
pub async fn identify(State(s): State<AppState>, ValidJson(r): ValidJson<IdentityRequest>) -> Result<Json<User>> {
    Ok(Json(s.shop.identify(&r.email, r.name).await?))
}

pub async fn me(State(s): State<AppState>, CurrentUser(caller): CurrentUser) -> Result<Json<User>> {
    s.shop.user(caller.user_id).await?.map(Json).ok_or(AppError::Unauthorized)
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoleRequest { pub role: Role }

pub async fn assign_role(
    State(s): State<AppState>,
    CurrentUser(caller): CurrentUser,
    IdPath(id): IdPath,
    ValidJson(r): ValidJson<RoleRequest>,
) -> Result<Json<User>> {
    Ok(Json(s.shop.assign_role(&caller, id, r.role).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 56))]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

pub async fn list_addresses(State(s): State<AppState>, CurrentUser(caller): CurrentUser) -> Result<Json<Vec<Address>>> {
    Ok(Json(s.shop.addresses(&caller).await?))
}

pub async fn add_address(
    State(s): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ValidJson(r): ValidJson<AddressRequest>,
) -> Result<(StatusCode, Json<Address>)> {
    let new = NewAddress { street: r.street, city: r.city, state: r.state, postal_code: r.postal_code, country: r.country, is_default: r.is_default };
    Ok((StatusCode::CREATED, Json(s.shop.add_address(&caller, new).await?)))
}

pub async fn delete_address(State(s): State<AppState>, CurrentUser(caller): CurrentUser, IdPath(id): IdPath) -> Result<StatusCode> {
    s.shop.delete_address(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
