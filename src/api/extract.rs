//! Request extractors that reject with [`AppError`] instead of axum's plain-text bodies.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use crate::domain::aggregates::Caller;
use crate::error::AppError;

/// Header carrying the id of the user the presentation layer authenticated.
pub const USER_HEADER: &str = "x-user-id";

/// The authenticated caller. The role is always read from the store.
#[derive(Clone, Copy, Debug)]
pub struct CurrentUser(pub Caller);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<Caller>() {
            return Ok(Self(*caller));
        }

        let Some(user_id) = parts
            .headers
            .get(USER_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| Uuid::parse_str(h.trim()).ok())
        else {
            tracing::debug!(uri = %parts.uri, "missing or malformed user header");
            return Err(AppError::Unauthorized);
        };

        let Some(user) = state.shop.user(user_id).await? else {
            tracing::warn!(%user_id, uri = %parts.uri, "unknown user");
            return Err(AppError::Unauthorized);
        };
        let caller = Caller::from(&user);
        parts.extensions.insert(caller);
        Ok(Self(caller))
    }
}

/// JSON body that has also passed its `validator` rules.
pub struct ValidJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| AppError::validation(e.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await.map_err(|e| AppError::validation(e.body_text()))?;
        Ok(Self(value))
    }
}

/// Single `{id}` path segment.
pub struct IdPath(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state).await.map_err(|e| AppError::validation(e.body_text()))?;
        Ok(Self(id))
    }
}
