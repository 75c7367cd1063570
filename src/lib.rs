//! Luxe Jewels Storefront
//!
//! Client-facing core of a jewelry storefront.
//!
//! ## Features
//! - Catalog query pipeline (filter, search, sort, paginate)
//! - Cart reconciliation with pluggable persistence
//! - Linear checkout sequencer with form validation
//! - Record-store CRUD boundary (in-memory or Postgres)

use thiserror::Error;

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::cart::{CartStore, CartUpdate};
pub use application::catalog::CatalogService;
pub use application::checkout::{CheckoutService, OrderConfirmation};
pub use domain::aggregates::{CartLine, Category, Checkout, CheckoutStep, Product};
pub use domain::query::{CatalogQuery, Dimension, FilterSet, Page, SortKey};
pub use domain::value_objects::{CategoryId, LineId, Money, PriceRange, ProductId};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("Product with id {0} not found")]
    ProductNotFound(ProductId),

    #[error("Category {0} not found")]
    CategoryNotFound(String),

    #[error("Size {size} is not offered for product {product_id}")]
    InvalidSize { product_id: ProductId, size: String },

    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error("Insufficient inventory")]
    InsufficientInventory,

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<infrastructure::records::RecordError> for EcommerceError {
    fn from(err: infrastructure::records::RecordError) -> Self {
        match err {
            infrastructure::records::RecordError::Invalid(msg) => Self::InvalidRecord(msg),
            other => Self::StorageError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
