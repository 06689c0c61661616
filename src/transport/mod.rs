//! Transport layer for sheet-query.
//!
//! - HTTP: upload form and JSON API
//! - Batch: one query from files on disk

pub mod batch;
pub mod http;

pub use batch::BatchTransport;
pub use http::HttpTransport;

use crate::error::AppResult;
use std::future::Future;

/// Trait for the ways the pipeline is driven.
pub trait Transport: Send + Sync {
    /// Start the transport and run until it is done or shut down.
    fn run(&self) -> impl Future<Output = AppResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
