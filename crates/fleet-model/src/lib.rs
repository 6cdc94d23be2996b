//! Shared data types for the fleet scheduler/executor pair.
//!
//! Everything here is plain data: offers, demands, task descriptors, status updates.
//! No type in this crate talks to the transport or owns mutable scheduling state.

mod domain;
pub use domain::*;

mod error;
pub use error::ModelError;
