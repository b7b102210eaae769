use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Run id recorded when an observation carries no run of its own.
pub const DEFAULT_RUN_ID: &str = "no-run-id-provided";

fn is_false(value: &bool) -> bool {
    !*value
}

/// Provenance and versioning envelope of one aspect observation.
///
/// `version` is the semantic aspect version as a decimal string and is
/// independent of the storage row version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_op: bool,
}

impl SystemMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata for observations that arrive without any: default run id, observed now.
    pub fn create_default() -> Self {
        Self {
            run_id: Some(DEFAULT_RUN_ID.to_string()),
            last_observed: Some(Utc::now().timestamp_millis()),
            ..Self::default()
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_last_observed(mut self, last_observed: i64) -> Self {
        self.last_observed = Some(last_observed);
        self
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn set_no_op(&mut self, no_op: bool) {
        self.no_op = no_op;
    }

    pub fn is_no_op(&self) -> bool {
        self.no_op
    }

    /// Semantic version, or `None` when missing or not a decimal integer.
    pub fn parsed_version(&self) -> Option<i64> {
        self.version
            .as_deref()
            .and_then(|version| version.trim().parse::<i64>().ok())
    }

    pub fn run_id_or_default(&self) -> &str {
        self.run_id.as_deref().unwrap_or(DEFAULT_RUN_ID)
    }

    /// Looks up a field by its wire name, falling back to `properties`.
    ///
    /// Used to evaluate rollback conditions such as `runId = <run>`.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "runId" => self.run_id.clone(),
            "lastRunId" => self.last_run_id.clone(),
            "version" => self.version.clone(),
            "lastObserved" => self.last_observed.map(|v| v.to_string()),
            "registryName" => self.registry_name.clone(),
            "registryVersion" => self.registry_version.clone(),
            other => self.properties.get(other).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unparsable_versions_are_absent() {
        let mut metadata = SystemMetadata::new();
        assert_eq!(metadata.parsed_version(), None);

        metadata.version = Some("not-a-number".into());
        assert_eq!(metadata.parsed_version(), None);

        metadata.version = Some("7".into());
        assert_eq!(metadata.parsed_version(), Some(7));
    }

    #[test]
    fn serializes_with_wire_names() {
        let mut metadata = SystemMetadata::new().with_run_id("run-1").with_last_observed(1000);
        metadata.set_no_op(true);

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["runId"], "run-1");
        assert_eq!(json["lastObserved"], 1000);
        assert_eq!(json["noOp"], true);
        assert!(json.get("version").is_none());
    }

    #[test]
    fn condition_fields_resolve_properties() {
        let metadata = SystemMetadata::create_default().with_property("pipeline", "nightly");
        assert_eq!(metadata.field("runId").as_deref(), Some(DEFAULT_RUN_ID));
        assert_eq!(metadata.field("pipeline").as_deref(), Some("nightly"));
        assert_eq!(metadata.field("missing"), None);
    }
}
