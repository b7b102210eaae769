use crate::storage::RetryPolicy;
use log::warn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const ALWAYS_EMIT_CHANGE_LOG_ENV: &str = "ALWAYS_EMIT_CHANGE_LOG";
pub const MAX_TRANSACTION_RETRY_ENV: &str = "MAX_TRANSACTION_RETRY";

/// Entity service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntityServiceConfig {
    /// Emit a change log for every write, no-ops included
    pub always_emit_change_log: bool,

    /// Attempts of the retryable write transaction, first try included
    pub max_transaction_attempts: u32,

    pub retry_base_backoff_ms: u64,

    pub retry_max_backoff_ms: u64,

    /// Restore partition size used when callers pass 0
    pub restore_default_batch_size: usize,
}

impl Default for EntityServiceConfig {
    fn default() -> Self {
        Self {
            always_emit_change_log: false,
            max_transaction_attempts: 3,
            retry_base_backoff_ms: 5,
            retry_max_backoff_ms: 100,
            restore_default_batch_size: 1000,
        }
    }
}

impl EntityServiceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the always-emit override
    pub fn always_emit_change_log(mut self, always_emit: bool) -> Self {
        self.always_emit_change_log = always_emit;
        self
    }

    /// Set maximum transaction attempts
    pub fn max_transaction_attempts(mut self, attempts: u32) -> Self {
        self.max_transaction_attempts = attempts;
        self
    }

    /// Set retry backoff bounds
    pub fn retry_backoff_ms(mut self, base: u64, max: u64) -> Self {
        self.retry_base_backoff_ms = base;
        self.retry_max_backoff_ms = max;
        self
    }

    /// Set the fallback restore partition size
    pub fn restore_default_batch_size(mut self, batch_size: usize) -> Self {
        self.restore_default_batch_size = batch_size;
        self
    }

    /// Defaults overridden by `ALWAYS_EMIT_CHANGE_LOG` and `MAX_TRANSACTION_RETRY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            always_emit_change_log: parse_or(
                ALWAYS_EMIT_CHANGE_LOG_ENV,
                lookup(ALWAYS_EMIT_CHANGE_LOG_ENV),
                defaults.always_emit_change_log,
            ),
            max_transaction_attempts: parse_or(
                MAX_TRANSACTION_RETRY_ENV,
                lookup(MAX_TRANSACTION_RETRY_ENV),
                defaults.max_transaction_attempts,
            ),
            ..defaults
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_transaction_attempts.max(1),
            base_backoff_ms: self.retry_base_backoff_ms,
            max_backoff_ms: self.retry_max_backoff_ms,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_transaction_attempts == 0 {
            return Err("max_transaction_attempts must be > 0".to_string());
        }

        if self.retry_base_backoff_ms > self.retry_max_backoff_ms {
            return Err("retry_base_backoff_ms cannot exceed retry_max_backoff_ms".to_string());
        }

        if self.restore_default_batch_size == 0 {
            return Err("restore_default_batch_size must be > 0".to_string());
        }

        Ok(())
    }
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!("ignoring unparsable {}='{}', keeping the default", name, raw);
            default
        }
    }
}
