//! Unified error handling at the HTTP boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::aggregates::{CartError, CheckoutError, OrderError, ReviewError};
use crate::store::StoreError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Caller is not authenticated.
    #[error("authentication required")]
    Unauthorized,

    /// Authenticated, but role or ownership is insufficient.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Malformed or out-of-range input.
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    /// Stock or availability violation.
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl AppError {
    pub fn forbidden(msg: impl Into<String>) -> Self { Self::Forbidden(msg.into()) }
    pub fn not_found(msg: impl Into<String>) -> Self { Self::NotFound(msg.into()) }
    pub fn validation(msg: impl Into<String>) -> Self { Self::Validation { code: "VALIDATION", message: msg.into() } }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            // Stock conflicts are reported as 400 to match existing clients.
            Self::Validation { .. } | Self::Conflict { .. } => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation { code, .. } | Self::Conflict { code, .. } => *code,
            Self::Store(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Don't expose internal error details to clients
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": self.code(), "message": message }))).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::not_found("resource not found"),
            StoreError::Referenced { entity, .. } => Self::Conflict {
                code: if entity == "product" { "PRODUCT_IN_USE" } else { "ADDRESS_IN_USE" },
                message: e.to_string(),
            },
            StoreError::Checkout(e) => e.into(),
            StoreError::Order(e) => e.into(),
            StoreError::Cart(e) => e.into(),
            StoreError::Money(e) => Self::validation(e.to_string()),
            other => Self::Store(other),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(e: CheckoutError) -> Self {
        let message = e.to_string();
        match e {
            CheckoutError::EmptyCart => Self::Validation { code: "EMPTY_CART", message },
            CheckoutError::InvalidAddress => Self::Validation { code: "INVALID_ADDRESS", message },
            CheckoutError::InsufficientStock { .. } => Self::Conflict { code: "INSUFFICIENT_STOCK", message },
            CheckoutError::TotalOutOfRange => Self::Validation { code: "VALIDATION", message },
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self { Self::Validation { code: "INVALID_TRANSITION", message: e.to_string() } }
}

impl From<CartError> for AppError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::LineNotFound => Self::not_found(e.to_string()),
            CartError::ExceedsStock { .. } => Self::Conflict { code: "INSUFFICIENT_STOCK", message: e.to_string() },
            CartError::QuantityOutOfRange => Self::validation(e.to_string()),
        }
    }
}

impl From<ReviewError> for AppError {
    fn from(e: ReviewError) -> Self {
        match e {
            ReviewError::NotCustomer | ReviewError::NotPurchased => Self::forbidden(e.to_string()),
            ReviewError::InvalidRating => Self::Validation { code: "INVALID_RATING", message: e.to_string() },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self { Self::validation(e.to_string()) }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::MoneyError;
    use uuid::Uuid;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("order").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::validation("bad").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Store(StoreError::DataCorruption("x".into())).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_domain_errors_map_to_codes() {
        let stock: AppError = StoreError::Checkout(CheckoutError::InsufficientStock {
            product_id: Uuid::nil(), product_name: "Lamp".into(), requested: 2, available: 1,
        })
        .into();
        assert_eq!(stock.code(), "INSUFFICIENT_STOCK");
        assert_eq!(stock.status(), StatusCode::BAD_REQUEST);
        assert!(stock.to_string().contains("Lamp"));

        let empty: AppError = CheckoutError::EmptyCart.into();
        assert_eq!(empty.code(), "EMPTY_CART");

        let in_use: AppError = StoreError::Referenced { entity: "product", id: Uuid::nil() }.into();
        assert_eq!(in_use.code(), "PRODUCT_IN_USE");

        let corrupt: AppError = StoreError::DataCorruption("bad row".into()).into();
        assert_eq!(corrupt.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let rating: AppError = ReviewError::InvalidRating.into();
        assert_eq!(rating.code(), "INVALID_RATING");
        assert_eq!(AppError::from(ReviewError::NotPurchased).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_overflow_is_a_validation_error() {
        for err in [
            AppError::from(StoreError::Money(MoneyError::OutOfRange)),
            AppError::from(StoreError::Cart(CartError::QuantityOutOfRange)),
            AppError::from(StoreError::Checkout(CheckoutError::TotalOutOfRange)),
        ] {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert_eq!(err.code(), "VALIDATION");
        }
    }
}
