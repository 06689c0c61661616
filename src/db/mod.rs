//! Database access layer.
//!
//! This module provides:
//! - Oracle client bootstrap
//! - Single-connection sessions per backend
//! - Row decoding into JSON scalars
//! - The chunked query executor
//! - The runtime database registry

pub mod executor;
pub mod oracle_client;
pub mod registry;
pub mod session;
pub mod types;

pub use executor::{ChunkedQueryExecutor, ExecutionOutcome};
pub use oracle_client::{ClientInit, init_oracle_client};
pub use registry::DatabaseRegistry;
pub use session::{DbSession, QuerySession, SessionOptions};
