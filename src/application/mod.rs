//! Application services: orchestrate domain rules over the persistence collaborators.
pub mod cart;
pub mod catalog;
pub mod checkout;
