use serde::{Deserialize, Serialize};

/// Range and pacing of an index restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreIndicesArgs {
    /// Offset of the first row to replay.
    pub start: usize,
    /// Maximum number of rows to replay.
    pub limit: usize,
    /// Rows per partition.
    pub batch_size: usize,
    /// Pause between partitions.
    pub batch_delay_ms: u64,
    /// Fabricate missing key/default aspects for every entity seen.
    pub create_default_aspects: bool,
    #[serde(default)]
    pub aspect_names: Vec<String>,
    #[serde(default)]
    pub urn: Option<String>,
    /// SQL LIKE pattern (`%` and `_` wildcards).
    #[serde(default)]
    pub urn_like: Option<String>,
}

impl Default for RestoreIndicesArgs {
    fn default() -> Self {
        Self {
            start: 0,
            limit: usize::MAX,
            batch_size: 1000,
            batch_delay_ms: 0,
            create_default_aspects: false,
            aspect_names: Vec::new(),
            urn: None,
            urn_like: None,
        }
    }
}

impl RestoreIndicesArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn batch_delay_ms(mut self, batch_delay_ms: u64) -> Self {
        self.batch_delay_ms = batch_delay_ms;
        self
    }

    pub fn create_default_aspects(mut self, create_default_aspects: bool) -> Self {
        self.create_default_aspects = create_default_aspects;
        self
    }

    pub fn aspect_name(mut self, aspect_name: impl Into<String>) -> Self {
        self.aspect_names.push(aspect_name.into());
        self
    }

    pub fn urn(mut self, urn: impl Into<String>) -> Self {
        self.urn = Some(urn.into());
        self
    }

    pub fn urn_like(mut self, pattern: impl Into<String>) -> Self {
        self.urn_like = Some(pattern.into());
        self
    }
}

/// Outcome of one replayed partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreIndicesResult {
    /// Rows skipped because they could not be deserialized or are not registered.
    pub ignored: usize,
    pub rows_migrated: usize,
    pub default_aspects_created: usize,
    pub time_get_rows_ms: u64,
    pub send_message_ms: u64,
    pub last_urn: Option<String>,
    pub last_aspect: Option<String>,
    /// Last isolated row failure, if any.
    pub failure: Option<String>,
}
