//! Runtime configuration store for named databases.
//!
//! Entries are loaded at startup and may be added while the server runs.
//! Nothing is persisted; the registry lives as long as the process.

use crate::error::{AppError, AppResult};
use crate::models::{
    AddDatabaseRequest, ConnectionDescriptor, DatabaseSettings, DatabaseSummary, DatabaseType,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct DatabaseRegistry {
    entries: Arc<RwLock<BTreeMap<String, DatabaseSettings>>>,
}

impl DatabaseRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from startup settings.
    ///
    /// Incomplete entries are kept; selecting one fails with the missing fields.
    pub fn from_settings(settings: impl IntoIterator<Item = (String, DatabaseSettings)>) -> Self {
        let entries: BTreeMap<_, _> = settings.into_iter().collect();
        for (name, entry) in &entries {
            if !entry.is_complete() {
                warn!(
                    database = %name,
                    missing = %entry.missing_fields().join(", "),
                    "Database configuration is incomplete"
                );
            }
        }
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Sorted database names.
    pub async fn names(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        entries.keys().cloned().collect()
    }

    /// List all databases with details.
    pub async fn list(&self) -> Vec<DatabaseSummary> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(name, settings)| DatabaseSummary::new(name, settings))
            .collect()
    }

    /// Validate and store a new database, replacing any entry with the same name.
    pub async fn add(&self, request: AddDatabaseRequest) -> AppResult<DatabaseSummary> {
        let (name, settings) = request.into_settings()?;
        let summary = DatabaseSummary::new(&name, &settings);

        let mut entries = self.entries.write().await;
        let replaced = entries.insert(name.clone(), settings).is_some();
        info!(database = %name, kind = %summary.kind, replaced, "Database added");

        Ok(summary)
    }

    /// Resolve a name to a validated connection descriptor.
    pub async fn descriptor(&self, name: &str) -> AppResult<ConnectionDescriptor> {
        let entries = self.entries.read().await;
        match entries.get(name) {
            Some(settings) => settings.descriptor(name),
            None => Err(AppError::database_not_found(name)),
        }
    }

    /// True if any entry targets Oracle.
    pub async fn has_oracle(&self) -> bool {
        let entries = self.entries.read().await;
        entries.values().any(|s| s.kind == DatabaseType::Oracle)
    }

    /// Get the number of configured databases.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
