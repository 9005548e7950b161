//! Adapters for the domain ports.
pub mod events;
pub mod gateway;
pub mod in_memory;
pub mod postgres;
