//! Domain-level errors (no external dependencies)

use thiserror::Error;

use crate::domain::entities::TaxonId;

/// Domain errors represent violations of tree and partitioning invariants.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("empty tree: nothing to partition")]
    EmptyTree,

    #[error("no root node found (every node has a parent)")]
    NoRoot,

    #[error("multiple root nodes: {0} and {1}")]
    MultipleRoots(TaxonId, TaxonId),

    #[error("duplicate taxon id: {0}")]
    DuplicateTaxon(TaxonId),

    #[error("taxon {child} references unknown parent {parent}")]
    UnknownParent { child: TaxonId, parent: TaxonId },

    #[error("cycle detected in hierarchy: {0} is unreachable from the root")]
    CycleDetected(TaxonId),

    #[error("invalid thresholds: {message}")]
    InvalidThresholds { message: String },

    #[error("clade record not found: {0}")]
    MissingClade(TaxonId),

    #[error("clade {0} is referenced more than once")]
    DuplicateReference(TaxonId),

    #[error("invalid clade record {key}: {message}")]
    InvalidRecord { key: String, message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
