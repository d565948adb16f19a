//! Domain layer: chat and source models, errors, and the worker port.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{IntakeError, PersistenceError, SupervisorError, SupervisorResult};
