//! sheet-query library
//!
//! Runs a SQL template over the `SERVICENAME` column of an uploaded
//! spreadsheet. Keys are split into IN-list sized chunks, each chunk is run on
//! one database session, and the combined rows are exported as a workbook.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod service;
pub mod sheet;
pub mod transport;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use service::{QueryReport, QueryService};
