//! Infrastructure layer: collaborator implementations and DI container
//!
//! This layer implements the storage, locking, media and ruleset contracts and
//! wires up services.

pub mod di;
pub mod error;
pub mod memory;
pub mod traits;

pub use error::{InfraError, InfraResult};
