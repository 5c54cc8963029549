//! OpenSASE Storefront
//!
//! Order and inventory core of a self-hosted storefront.
//!
//! ## Features
//! - Product catalog with filtering and staff-only editing
//! - Per-user cart
//! - Atomic checkout that never oversells stock
//! - Order status lifecycle with role-scoped reads
//! - Reviews gated on delivered purchases

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod publisher;
pub mod service;
pub mod store;
pub mod telemetry;

pub use config::Config;
pub use error::AppError;
pub use service::{OrderPolicy, Storefront};
