//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on collaborator traits (WorkpieceStore, LockService, etc.)
//! but are themselves concrete structs, not traits.

mod explode;
mod links;
mod pagination;
mod session;

pub use explode::{ExplodeOutcome, ExplodeService};
pub use crate::domain::decomposition::ORIGINAL_SUFFIX;
pub use links::{parse_insertion_position, LinkService};
pub use pagination::PaginationService;
pub use session::{EditSession, LockGuard, SessionService};
