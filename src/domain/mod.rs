//! Domain layer: entities and business logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod entities;
pub mod error;
pub mod flatten;
pub mod partition;
pub mod record;
pub mod vernacular;

pub use arena::{TaxonTree, TreeNode};
pub use entities::*;
pub use error::{DomainError, DomainResult};
pub use flatten::TreeFlattener;
pub use partition::{CladePartitioner, PartitionStats, Thresholds};
pub use record::{reachable_clades, reassemble, CladeRecord};
pub use vernacular::{accept_label, looks_like_binomial, NamePass};
