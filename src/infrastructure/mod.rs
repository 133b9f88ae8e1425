//! Infrastructure layer: I/O implementations and DI container
//!
//! This layer implements I/O boundary traits and wires up services.

pub mod atproto;
pub mod di;
pub mod error;
pub mod http;
pub mod otol;
pub mod traits;
pub mod wikidata;

pub use error::{InfraError, InfraResult, RemoteError, RemoteResult};
