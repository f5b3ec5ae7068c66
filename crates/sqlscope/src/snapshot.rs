use crate::dialect::Dialect;
use crate::error::{ScopeError, ScopeResult};
use crate::schema::Schema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SNAPSHOT_VERSION: u32 = 1;

/// A schema snapshot persisted to disk.
///
/// Snapshots are replaced wholesale whenever the caller connects to another
/// database; nothing here mutates one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub version: u32,
    pub retrieved_at: DateTime<Utc>,
    /// Dialect of the database the schema was read from, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<Dialect>,
    /// Free-form label (database name, connection alias).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub schema: Schema,
}

impl SchemaSnapshot {
    pub fn new(schema: Schema) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            retrieved_at: Utc::now(),
            dialect: None,
            database: None,
            schema,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Parse a snapshot document, or a bare schema document (the request wire
    /// format) which is wrapped into a fresh snapshot.
    pub fn from_json(data: &[u8]) -> ScopeResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| ScopeError::Serialization(format!("Failed to parse schema JSON: {e}")))?;

        let is_snapshot = value.get("version").is_some() && value.get("schema").is_some();
        if is_snapshot {
            let snapshot: SchemaSnapshot = serde_json::from_value(value).map_err(|e| {
                ScopeError::Serialization(format!("Failed to parse schema snapshot: {e}"))
            })?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(ScopeError::Other(format!(
                    "Unsupported schema snapshot version: {}",
                    snapshot.version
                )));
            }
            return Ok(snapshot);
        }

        let schema: Schema = serde_json::from_value(value)
            .map_err(|e| ScopeError::Serialization(format!("Failed to parse schema: {e}")))?;
        Ok(Self::new(schema))
    }

    pub fn load(path: &Path) -> ScopeResult<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    /// Write the snapshot next to `path` and rename it into place.
    pub fn save(&self, path: &Path) -> ScopeResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(self).map_err(|e| {
            ScopeError::Serialization(format!("Failed to serialize schema snapshot: {e}"))
        })?;

        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
