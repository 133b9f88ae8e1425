//! Partition large taxonomies into size-bounded clade records and persist
//! them in a rate-limited record store.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
