// Adapters layer: concrete implementations of the domain ports.

pub mod directions;
pub mod memory_store;
pub mod rest_store;
