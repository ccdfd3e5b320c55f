//! Durable alert storage.
//!
//! Row-oriented persistence keyed by alert token. Atomicity is required at
//! the single-row level only; [`bulk_erase`](AlertStorage::bulk_erase) may
//! be non-atomic across rows but must continue past individual failures.

pub mod sqlite;

pub use sqlite::SqliteAlertStorage;

use crate::alert::AssetConfig;
use crate::error::Result;
use crate::types::AlertState;
use serde::{Deserialize, Serialize};

/// Persisted mirror of an alert, sufficient to reconstruct it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Opaque unique token.
    pub token: String,
    /// Alert type name.
    pub type_name: String,
    /// Scheduled fire time, RFC 3339.
    pub scheduled_iso: String,
    /// Last-committed state.
    pub state: AlertState,
    /// Type-specific asset metadata.
    #[serde(default)]
    pub assets: AssetConfig,
}

/// CRUD and bulk-erase over persisted alert records.
pub trait AlertStorage: Send + Sync {
    /// Open an existing database. Fails if it does not exist.
    fn open(&self) -> Result<()>;

    /// Create the database (and parent directories) from scratch.
    fn create_database(&self) -> Result<()>;

    /// Erase every row, keeping the database itself.
    fn clear_database(&self) -> Result<()>;

    /// Load all persisted records.
    fn load(&self) -> Result<Vec<AlertRecord>>;

    /// Insert a new row. Fails if the token already exists.
    fn store(&self, record: &AlertRecord) -> Result<()>;

    /// Update the row for `record.token`. Fails if it does not exist.
    fn modify(&self, record: &AlertRecord) -> Result<()>;

    /// Delete the row for `token`. Deleting an absent row is not an error.
    fn erase(&self, token: &str) -> Result<()>;

    /// Delete every listed row, continuing past individual failures.
    /// Succeeds iff all deletions succeeded.
    fn bulk_erase(&self, tokens: &[String]) -> Result<()>;
}
