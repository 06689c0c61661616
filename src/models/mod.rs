//! Data models for sheet-query.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    AddDatabaseRequest, ConnectionDescriptor, DatabaseSettings, DatabaseSummary, DatabaseType,
};
pub use query::{
    DEFAULT_PLACEHOLDER, KEY_COLUMN, MAX_CHUNK_SIZE, QueryTemplate, ResultSet,
};
