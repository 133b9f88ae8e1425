//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on I/O boundary traits (TreeSource, NameSource, RecordStore)
//! but are themselves concrete structs, not traits.

mod enrichment;
mod sync;
mod writer;

pub use enrichment::{EnrichmentOptions, EnrichmentReport, EnrichmentService};
pub use sync::{FetchRequest, SyncPlan, SyncService};
pub use writer::{timestamp_now, RecordFailure, RecordWriter, WriteMode, WriteReport, WriterOptions};
