// ============================================================================
// Entity Registry
// ============================================================================
//
// Capability lookup for aspect types. The store never branches on concrete
// aspect kinds; it asks the registry whether an aspect is timeseries-only
// and whether it declares lineage relationships.
//
// ============================================================================

pub mod constants;
pub mod spec;

pub use spec::{AspectSpec, DefaultAspectSpec, EntitySpec, RelationshipSpec};

use crate::core::{Result, StoreError};
use constants::*;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

/// Schema registry the store consults for aspect capabilities.
pub trait EntityRegistry: Send + Sync {
    fn entity_spec(&self, entity_type: &str) -> Option<&EntitySpec>;

    fn aspect_spec(&self, entity_type: &str, aspect_name: &str) -> Result<&AspectSpec> {
        self.entity_spec(entity_type)
            .and_then(|entity| entity.aspect_spec(aspect_name))
            .ok_or_else(|| StoreError::UnknownAspect {
                entity_type: entity_type.to_string(),
                aspect_name: aspect_name.to_string(),
            })
    }

    fn is_timeseries(&self, entity_type: &str, aspect_name: &str) -> Result<bool> {
        Ok(self.aspect_spec(entity_type, aspect_name)?.is_timeseries())
    }

    fn has_lineage_relationship(&self, entity_type: &str, aspect_name: &str) -> Result<bool> {
        Ok(self
            .aspect_spec(entity_type, aspect_name)?
            .has_lineage_relationship())
    }
}

/// Registry backed by a fixed set of entity specs.
#[derive(Debug, Clone, Default)]
pub struct StaticEntityRegistry {
    entities: HashMap<String, EntitySpec>,
}

#[derive(Deserialize)]
struct RegistryDocument {
    entities: Vec<EntitySpec>,
}

impl StaticEntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: EntitySpec) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Loads `{"entities": [...]}` documents.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: RegistryDocument = serde_json::from_str(json).map_err(|err| {
            StoreError::ParseError(format!("invalid entity registry document: {}", err))
        })?;
        Ok(document
            .entities
            .into_iter()
            .fold(Self::new(), |registry, entity| registry.with_entity(entity)))
    }

    pub fn entity_names(&self) -> Vec<&str> {
        let mut names = self.entities.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Entities and aspects of a typical data catalog.
    pub fn builtin() -> Self {
        Self::new()
            .with_entity(
                EntitySpec::new(CORP_USER_ENTITY_NAME, CORP_USER_KEY_ASPECT_NAME, &["username"])
                    .with_aspect(AspectSpec::new(CORP_USER_INFO_ASPECT_NAME))
                    .with_aspect(AspectSpec::new(CORP_USER_EDITABLE_INFO_ASPECT_NAME))
                    .with_aspect(AspectSpec::new(GROUP_MEMBERSHIP_ASPECT_NAME))
                    .with_aspect(AspectSpec::new(STATUS_ASPECT_NAME)),
            )
            .with_entity(
                EntitySpec::new(CORP_GROUP_ENTITY_NAME, CORP_GROUP_KEY_ASPECT_NAME, &["name"])
                    .with_aspect(AspectSpec::new(CORP_GROUP_INFO_ASPECT_NAME))
                    .with_aspect(AspectSpec::new(STATUS_ASPECT_NAME)),
            )
            .with_entity(
                EntitySpec::new(
                    DATASET_ENTITY_NAME,
                    DATASET_KEY_ASPECT_NAME,
                    &["platform", "name", "origin"],
                )
                .with_aspect(AspectSpec::new(STATUS_ASPECT_NAME))
                .with_aspect(AspectSpec::new(DATASET_PROPERTIES_ASPECT_NAME))
                .with_aspect(AspectSpec::new(OWNERSHIP_ASPECT_NAME))
                .with_aspect(AspectSpec::new(BROWSE_PATHS_V2_ASPECT_NAME))
                .with_aspect(
                    AspectSpec::new(UPSTREAM_LINEAGE_ASPECT_NAME)
                        .with_lineage("DownstreamOf", &[DATASET_ENTITY_NAME]),
                )
                .with_aspect(AspectSpec::timeseries(DATASET_PROFILE_ASPECT_NAME))
                .with_default_aspect(BROWSE_PATHS_V2_ASPECT_NAME, json!({"path": []})),
            )
            .with_entity(
                EntitySpec::new(DATA_JOB_ENTITY_NAME, DATA_JOB_KEY_ASPECT_NAME, &["flow", "jobId"])
                    .with_aspect(AspectSpec::new(DATA_JOB_INFO_ASPECT_NAME))
                    .with_aspect(AspectSpec::new(STATUS_ASPECT_NAME))
                    .with_aspect(
                        AspectSpec::new(DATA_JOB_INPUT_OUTPUT_ASPECT_NAME)
                            .with_lineage("Consumes", &[DATASET_ENTITY_NAME])
                            .with_lineage("Produces", &[DATASET_ENTITY_NAME]),
                    ),
            )
            .with_entity(
                EntitySpec::new(
                    DATA_PLATFORM_ENTITY_NAME,
                    DATA_PLATFORM_KEY_ASPECT_NAME,
                    &["platformName"],
                )
                .with_aspect(AspectSpec::new(DATA_PLATFORM_INFO_ASPECT_NAME)),
            )
            .with_entity(
                EntitySpec::new(ACCESS_TOKEN_ENTITY_NAME, ACCESS_TOKEN_KEY_ASPECT_NAME, &["id"])
                    .with_aspect(AspectSpec::new(ACCESS_TOKEN_INFO_ASPECT_NAME)),
            )
            .with_entity(
                EntitySpec::new(
                    INGESTION_SOURCE_ENTITY_NAME,
                    INGESTION_SOURCE_KEY_ASPECT_NAME,
                    &["id"],
                )
                .with_aspect(AspectSpec::new(INGESTION_INFO_ASPECT_NAME)),
            )
            .with_entity(
                EntitySpec::new(POLICY_ENTITY_NAME, DATAHUB_POLICY_KEY_ASPECT_NAME, &["id"])
                    .with_aspect(AspectSpec::new(DATAHUB_POLICY_INFO_ASPECT_NAME)),
            )
    }
}

impl EntityRegistry for StaticEntityRegistry {
    fn entity_spec(&self, entity_type: &str) -> Option<&EntitySpec> {
        self.entities.get(entity_type)
    }
}
