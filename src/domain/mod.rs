//! Domain layer: aggregates, value objects, events and the catalog query pipeline.
pub mod aggregates;
pub mod events;
pub mod query;
pub mod value_objects;
