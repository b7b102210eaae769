use super::SystemMetadata;
use crate::core::{Result, StoreError, Urn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One persisted aspect row, exactly as storage keeps it.
///
/// Content and system metadata stay serialized until someone asks for them,
/// so corrupt history can be streamed and skipped row by row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectRow {
    pub urn: String,
    pub aspect: String,
    /// Storage-owned row version, 0 for the first row of a key.
    pub version: i64,
    /// Serialized aspect content.
    pub metadata: String,
    pub created_on: DateTime<Utc>,
    pub created_by: String,
    pub created_for: Option<String>,
    pub system_metadata: Option<String>,
}

/// A deserialized aspect together with its versioning envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemAspect {
    pub urn: Urn,
    pub aspect_name: String,
    pub row_version: i64,
    pub record: Value,
    pub system_metadata: SystemMetadata,
    pub created_on: DateTime<Utc>,
    pub created_by: String,
    pub created_for: Option<String>,
}

impl SystemAspect {
    /// Deserializes a stored row.
    ///
    /// Rows written before system metadata existed get default metadata.
    pub fn from_row(row: &AspectRow) -> Result<Self> {
        let urn = Urn::parse(row.urn.as_str())?;
        let record = serde_json::from_str::<Value>(&row.metadata).map_err(|err| {
            StoreError::SerializationError(format!(
                "failed to deserialize aspect {}/{} v{}: {}",
                row.urn, row.aspect, row.version, err
            ))
        })?;
        let system_metadata = match row.system_metadata.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw).map_err(|err| {
                StoreError::SerializationError(format!(
                    "failed to deserialize system metadata of {}/{}: {}",
                    row.urn, row.aspect, err
                ))
            })?,
            _ => SystemMetadata::create_default(),
        };

        Ok(Self {
            urn,
            aspect_name: row.aspect.clone(),
            row_version: row.version,
            record,
            system_metadata,
            created_on: row.created_on,
            created_by: row.created_by.clone(),
            created_for: row.created_for.clone(),
        })
    }

    pub fn to_row(&self) -> Result<AspectRow> {
        Ok(AspectRow {
            urn: self.urn.to_string(),
            aspect: self.aspect_name.clone(),
            version: self.row_version,
            metadata: serde_json::to_string(&self.record)?,
            created_on: self.created_on,
            created_by: self.created_by.clone(),
            created_for: self.created_for.clone(),
            system_metadata: Some(serde_json::to_string(&self.system_metadata)?),
        })
    }

    pub fn system_metadata_version(&self) -> Option<i64> {
        self.system_metadata.parsed_version()
    }
}
