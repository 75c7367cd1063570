//! Infrastructure: record store and cart persistence collaborators.
pub mod cart_storage;
pub mod records;
