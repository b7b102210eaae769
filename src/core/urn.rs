use super::{Result, StoreError};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref URN_PATTERN: Regex =
        Regex::new(r"^urn:([A-Za-z0-9._-]+):([A-Za-z][A-Za-z0-9_]*):(.+)$").unwrap();
}

/// Opaque, globally unique identifier of an entity.
///
/// Only the entity type tag is ever extracted; the key part is carried as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Urn {
    raw: String,
    type_start: usize,
    type_end: usize,
}

impl Urn {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let (type_start, type_end) = {
            let captures = URN_PATTERN
                .captures(&raw)
                .ok_or_else(|| StoreError::ParseError(format!("invalid urn '{}'", raw)))?;
            let entity_type = captures
                .get(2)
                .ok_or_else(|| StoreError::ParseError(format!("urn '{}' has no entity type", raw)))?;
            (entity_type.start(), entity_type.end())
        };

        Ok(Self {
            raw,
            type_start,
            type_end,
        })
    }

    pub fn entity_type(&self) -> &str {
        &self.raw[self.type_start..self.type_end]
    }

    /// Everything after the entity type tag, e.g. `(urn:li:dataPlatform:hive,db.t,PROD)`.
    pub fn entity_key(&self) -> &str {
        &self.raw[self.type_end + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Urn {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Urn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Urn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Urn::parse(raw).map_err(serde::de::Error::custom)
    }
}
