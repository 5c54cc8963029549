//! HTTP surface.
//!
//! Routes live under `/api/v1`; `/health` sits at the root for health checks.

mod cart;
mod catalog;
pub mod extract;
mod orders;
mod users;

use axum::{routing::{delete, get, patch, post, put}, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::service::Storefront;

#[derive(Clone)]
pub struct AppState {
    pub shop: Storefront,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/identity", post(users::identify))
        .route("/me", get(users::me))
        .route("/users/:id/role", put(users::assign_role))
        .route("/addresses", get(users::list_addresses).post(users::add_address))
        .route("/addresses/:id", delete(users::delete_address))
        .route("/products", get(catalog::list_products).post(catalog::create_product))
        .route("/products/:id", get(catalog::get_product).put(catalog::update_product).delete(catalog::delete_product))
        .route("/reviews", get(catalog::list_reviews).post(catalog::submit_review))
        .route("/cart", get(cart::get_cart).post(cart::add_item))
        .route("/cart/items/:id", patch(cart::update_item).delete(cart::remove_item))
        .route("/orders", get(orders::list_orders).post(orders::place_order))
        .route("/orders/:id", get(orders::get_order).patch(orders::update_status));

    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-storefront"})) }))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
