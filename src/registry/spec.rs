use crate::core::{Result, StoreError, Urn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An edge an aspect declares towards other entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipSpec {
    pub name: String,
    #[serde(default)]
    pub entity_types: Vec<String>,
    /// Upstream/downstream edges consumed by lineage graphs.
    #[serde(default)]
    pub is_lineage: bool,
}

/// Capabilities of one aspect type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectSpec {
    pub name: String,
    /// Append-only, time-bucketed aspect that bypasses versioning.
    #[serde(default)]
    pub timeseries: bool,
    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
}

impl AspectSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeseries: false,
            relationships: Vec::new(),
        }
    }

    pub fn timeseries(name: impl Into<String>) -> Self {
        Self {
            timeseries: true,
            ..Self::new(name)
        }
    }

    pub fn with_relationship(mut self, relationship: RelationshipSpec) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn with_lineage(self, name: impl Into<String>, entity_types: &[&str]) -> Self {
        self.with_relationship(RelationshipSpec {
            name: name.into(),
            entity_types: entity_types.iter().map(|t| t.to_string()).collect(),
            is_lineage: true,
        })
    }

    pub fn is_timeseries(&self) -> bool {
        self.timeseries
    }

    pub fn has_lineage_relationship(&self) -> bool {
        self.relationships.iter().any(|relationship| relationship.is_lineage)
    }
}

/// Aspect an entity should carry even when nobody wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultAspectSpec {
    pub aspect_name: String,
    pub value: Value,
}

/// Shape of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySpec {
    pub name: String,
    pub key_aspect: String,
    /// Field names of the key aspect, in urn key order.
    #[serde(default)]
    pub key_fields: Vec<String>,
    #[serde(default)]
    pub aspects: Vec<AspectSpec>,
    #[serde(default)]
    pub default_aspects: Vec<DefaultAspectSpec>,
}

impl EntitySpec {
    pub fn new(name: impl Into<String>, key_aspect: impl Into<String>, key_fields: &[&str]) -> Self {
        let key_aspect = key_aspect.into();
        Self {
            name: name.into(),
            aspects: vec![AspectSpec::new(key_aspect.clone())],
            key_aspect,
            key_fields: key_fields.iter().map(|f| f.to_string()).collect(),
            default_aspects: Vec::new(),
        }
    }

    pub fn with_aspect(mut self, aspect: AspectSpec) -> Self {
        self.aspects.push(aspect);
        self
    }

    pub fn with_default_aspect(mut self, aspect_name: impl Into<String>, value: Value) -> Self {
        self.default_aspects.push(DefaultAspectSpec {
            aspect_name: aspect_name.into(),
            value,
        });
        self
    }

    pub fn aspect_spec(&self, aspect_name: &str) -> Option<&AspectSpec> {
        self.aspects.iter().find(|aspect| aspect.name == aspect_name)
    }

    pub fn is_key_aspect(&self, aspect_name: &str) -> bool {
        self.key_aspect == aspect_name
    }

    /// Builds the key aspect content from the urn's key part.
    ///
    /// Tuple keys `(a,b,c)` map positionally onto `key_fields`; a plain key
    /// fills the single key field (or `id` when none is declared).
    pub fn key_aspect_value(&self, urn: &Urn) -> Result<Value> {
        let parts = split_key_parts(urn.entity_key());
        let mut fields = Map::new();

        if self.key_fields.is_empty() {
            fields.insert("id".to_string(), Value::String(urn.entity_key().to_string()));
            return Ok(Value::Object(fields));
        }

        if parts.len() != self.key_fields.len() {
            return Err(StoreError::ParseError(format!(
                "urn '{}' has {} key part(s), entity '{}' expects {}",
                urn,
                parts.len(),
                self.name,
                self.key_fields.len()
            )));
        }

        for (field, part) in self.key_fields.iter().zip(parts) {
            fields.insert(field.clone(), Value::String(part));
        }
        Ok(Value::Object(fields))
    }
}

fn split_key_parts(key: &str) -> Vec<String> {
    let Some(inner) = key.strip_prefix('(').and_then(|k| k.strip_suffix(')')) else {
        return vec![key.to_string()];
    };

    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in inner.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tuple_keys_map_onto_key_fields() {
        let spec = EntitySpec::new("dataset", "datasetKey", &["platform", "name", "origin"]);
        let urn = Urn::parse("urn:li:dataset:(urn:li:dataPlatform:hive,db.table,PROD)").unwrap();

        assert_eq!(
            spec.key_aspect_value(&urn).unwrap(),
            json!({"platform": "urn:li:dataPlatform:hive", "name": "db.table", "origin": "PROD"})
        );
    }

    #[test]
    fn nested_tuples_stay_whole() {
        let spec = EntitySpec::new("dataJob", "dataJobKey", &["flow", "jobId"]);
        let urn =
            Urn::parse("urn:li:dataJob:(urn:li:dataFlow:(airflow,etl,prod),load_users)").unwrap();

        assert_eq!(
            spec.key_aspect_value(&urn).unwrap(),
            json!({"flow": "urn:li:dataFlow:(airflow,etl,prod)", "jobId": "load_users"})
        );
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let spec = EntitySpec::new("dataset", "datasetKey", &["platform", "name", "origin"]);
        let urn = Urn::parse("urn:li:dataset:just-a-name").unwrap();
        assert!(spec.key_aspect_value(&urn).is_err());
    }

    #[test]
    fn lineage_is_a_declared_capability() {
        let plain = AspectSpec::new("status");
        let lineage = AspectSpec::new("upstreamLineage").with_lineage("DownstreamOf", &["dataset"]);
        assert!(!plain.has_lineage_relationship());
        assert!(lineage.has_lineage_relationship());
        assert!(AspectSpec::timeseries("datasetProfile").is_timeseries());
    }
}
