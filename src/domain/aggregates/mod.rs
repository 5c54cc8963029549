//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod review;
pub mod user;

pub use product::{NewProduct, Product, ProductError, ProductFilter, ProductPatch};
pub use order::{Checkout, CheckoutError, Order, OrderError, OrderItem, OrderOwner, OrderStatus, OrderWithOwner, Transition, TransitionPolicy};
pub use cart::{Cart, CartError, CartLine, CartView, PricedLine};
pub use review::{can_review, Review, ReviewError};
pub use user::{normalize_email, Address, Caller, NewAddress, User};
