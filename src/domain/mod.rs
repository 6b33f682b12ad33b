//! Domain layer: structure model and the algorithms that edit it
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod decomposition;
pub mod division;
pub mod editor;
pub mod error;
pub mod pagination;
pub mod snapshot;
pub mod view;
pub mod workpiece;

pub use arena::{DivisionId, DivisionTree, PostOrder, PreOrder};
pub use decomposition::Decomposition;
pub use division::{
    Division, LinkedResource, Logical, LogicalPart, MetadataEntry, Physical, PhysicalPart, Variant,
};
pub use editor::InsertionPosition;
pub use error::{DomainError, DomainResult};
pub use pagination::{PaginationScope, Paginator, PaginatorMode, PaginatorType, RomanNumeral};
pub use snapshot::{LogicalSnapshot, PhysicalSnapshot, WorkpieceSnapshot};
pub use view::{LogicalId, PhysicalId, View};
pub use workpiece::{ProcessingNote, Workpiece};
