//! Storefront domain model: aggregates, value objects, events and pricing.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod value_objects;
