//! Hybrid relational/document query core
//!
//! Resolves predicates against both stores, intersects the sample ids,
//! checks the cross-store reference and assembles combined records.

pub mod assembler;
pub mod coordinator;
pub mod error;
pub mod idset;
pub mod predicates;
pub mod relations;
pub mod resolver;

pub use assembler::{assemble, Assembly, CombinedRecord, IdOrigin};
pub use coordinator::{CombinedQueryResult, FederatedQueryCoordinator, QueryStage};
pub use error::{FederationError, FederationResult, ValidationError};
pub use idset::IdSet;
pub use predicates::{validate, CombinedPredicates, Pagination, ValidatedQuery};
pub use relations::{FieldRef, QueryWarning, SoftReference, WarningKind, SAMPLE_REFERENCE};
pub use resolver::{call_store, DocumentResolution};
