//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Category, Product};
pub use order::{Checkout, CheckoutStep, OrderError, OrderSummary, PaymentInfo, ShippingInfo};
pub use cart::{Cart, CartError, CartLine};
