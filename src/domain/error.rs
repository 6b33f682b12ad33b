//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Domain errors represent structural rule violations.
/// Every mutating operation reports them before touching the model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("division is not reachable from the tree root: {0}")]
    ReferenceNotInTree(String),

    #[error("cannot insert a sibling of the root division")]
    NoParentForSibling,

    #[error("no link to workpiece '{0}' found")]
    LinkNotFound(String),

    #[error("workpiece '{0}' has no top-level logical divisions to explode")]
    NothingToExplode(String),

    #[error("workpiece '{0}' already links to child workpieces")]
    AlreadyParent(String),

    #[error("workpiece '{id}' is locked by {holder}")]
    ObjectLocked { id: String, holder: String },

    #[error("view references a physical division outside the model: {0}")]
    DanglingView(String),

    #[error("cannot move a division into its own subtree: {0}")]
    CycleDetected(String),

    #[error("the root division cannot be removed")]
    CannotRemoveRoot,

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
