//! Pure domain model: no I/O, no persistence.
pub mod aggregates;
pub mod events;
pub mod value_objects;
