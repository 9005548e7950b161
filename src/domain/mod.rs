//! Domain layer: value objects, aggregates, events and the ports to external collaborators.
pub mod aggregates;
pub mod events;
pub mod ports;
pub mod value_objects;
