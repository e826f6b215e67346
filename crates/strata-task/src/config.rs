//! Configuration surface, loaded from environment variables with
//! a `HOME`/`APPDATA` fallback consulted exactly once.

use std::env;
use std::path::PathBuf;

use crate::error::{Result, TaskError};

/// A named group of worker threads within a [`crate::pool::ThreadPool`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadGroupConfig {
    /// Share of the pool's total thread budget this group should receive,
    /// as a percentage (`0.0..=100.0`); groups typically sum to 100 but are
    /// not required to.
    pub count_percent: f64,
    /// Hard floor on this group's worker count regardless of `count_percent`.
    pub min_count: usize,
    /// Prefix used to name this group's worker threads (`"{id_prefix}-{n}"`).
    pub id_prefix: String,
    /// Free-form tags consumers can use to select a group (e.g. routing
    /// outbox drain jobs onto an `"io"`-tagged group).
    pub tags: Vec<String>,
}

/// Connection settings for the KV backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    /// Connection string or file path for the backend, e.g.
    /// `"memory"` or a SurrealKV data directory.
    pub endpoint: String,
    /// Namespace the backend should select.
    pub namespace: String,
    /// Database name within the namespace.
    pub database: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "memory".to_string(),
            namespace: "strata".to_string(),
            database: "strata".to_string(),
        }
    }
}

/// Producer queue tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerConfig {
    /// Maximum number of outbox drain jobs running at once, across all
    /// topics.
    pub max_parallel_jobs: usize,
    /// Base backoff before the first retry of a failed send.
    pub retry_base_delay_ms: u64,
    /// Ceiling the exponential backoff is clamped to.
    pub retry_max_delay_ms: u64,
    /// Number of consecutive send failures after which a message is moved
    /// to the local failed set.
    pub max_attempts: u32,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            max_parallel_jobs: 4,
            retry_base_delay_ms: 200,
            retry_max_delay_ms: 30_000,
            max_attempts: 8,
        }
    }
}

/// Top-level configuration for a Strata process.
#[derive(Debug, Clone, PartialEq)]
pub struct StrataConfig {
    /// Directory used for on-disk state (SurrealKV data files, local
    /// outbox spill); resolved from `STRATA_HOME`, falling back to the
    /// platform home directory joined with `.strata`.
    pub home: PathBuf,
    /// Thread groups backing the shared [`crate::pool::ThreadPool`]. Empty
    /// means "derive a single anonymous group from available parallelism".
    pub threads: Vec<ThreadGroupConfig>,
    /// Threads reserved for the rest of the process when `threads` is
    /// empty and the pool size is derived automatically.
    pub reserve_thread_count: usize,
    /// KV backend connection settings.
    pub db: DbConfig,
    /// Producer queue tuning.
    pub producer: ProducerConfig,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            threads: Vec::new(),
            reserve_thread_count: 0,
            db: DbConfig::default(),
            producer: ProducerConfig::default(),
        }
    }
}

impl StrataConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults (and, for `home`, to the platform home directory) for
    /// anything unset.
    ///
    /// Recognized variables: `STRATA_HOME`, `STRATA_DB_ENDPOINT`,
    /// `STRATA_DB_NAMESPACE`, `STRATA_DB_DATABASE`,
    /// `STRATA_PRODUCER_MAX_PARALLEL_JOBS`,
    /// `STRATA_PRODUCER_RETRY_BASE_DELAY_MS`,
    /// `STRATA_PRODUCER_RETRY_MAX_DELAY_MS`,
    /// `STRATA_PRODUCER_MAX_ATTEMPTS`, `STRATA_RESERVE_THREAD_COUNT`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(home) = env::var("STRATA_HOME") {
            config.home = PathBuf::from(home);
        }

        if let Ok(endpoint) = env::var("STRATA_DB_ENDPOINT") {
            config.db.endpoint = endpoint;
        }
        if let Ok(namespace) = env::var("STRATA_DB_NAMESPACE") {
            config.db.namespace = namespace;
        }
        if let Ok(database) = env::var("STRATA_DB_DATABASE") {
            config.db.database = database;
        }

        if let Ok(raw) = env::var("STRATA_PRODUCER_MAX_PARALLEL_JOBS") {
            config.producer.max_parallel_jobs = parse_env("STRATA_PRODUCER_MAX_PARALLEL_JOBS", &raw)?;
        }
        if let Ok(raw) = env::var("STRATA_PRODUCER_RETRY_BASE_DELAY_MS") {
            config.producer.retry_base_delay_ms =
                parse_env("STRATA_PRODUCER_RETRY_BASE_DELAY_MS", &raw)?;
        }
        if let Ok(raw) = env::var("STRATA_PRODUCER_RETRY_MAX_DELAY_MS") {
            config.producer.retry_max_delay_ms =
                parse_env("STRATA_PRODUCER_RETRY_MAX_DELAY_MS", &raw)?;
        }
        if let Ok(raw) = env::var("STRATA_PRODUCER_MAX_ATTEMPTS") {
            config.producer.max_attempts = parse_env("STRATA_PRODUCER_MAX_ATTEMPTS", &raw)?;
        }
        if let Ok(raw) = env::var("STRATA_RESERVE_THREAD_COUNT") {
            config.reserve_thread_count = parse_env("STRATA_RESERVE_THREAD_COUNT", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.producer.max_parallel_jobs == 0 {
            return Err(TaskError::ConfigInvalid(
                "producer.max_parallel_jobs must be at least 1".to_string(),
            ));
        }
        if self.producer.retry_base_delay_ms > self.producer.retry_max_delay_ms {
            return Err(TaskError::ConfigInvalid(
                "producer.retry_base_delay_ms must not exceed retry_max_delay_ms".to_string(),
            ));
        }
        if self.producer.max_attempts == 0 {
            return Err(TaskError::ConfigInvalid(
                "producer.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| TaskError::ConfigInvalid(format!("{name} is not a valid value: '{raw}'")))
}

/// Resolve the platform home directory exactly once, joined with
/// `.strata`, without consulting the environment again after this call.
fn default_home() -> PathBuf {
    let home = env::var_os("HOME")
        .or_else(|| env::var_os("APPDATA"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".strata")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_internally_valid() {
        let config = StrataConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_max_parallel_jobs() {
        let mut config = StrataConfig::default();
        config.producer.max_parallel_jobs = 0;
        assert!(matches!(config.validate(), Err(TaskError::ConfigInvalid(_))));
    }

    #[test]
    fn rejects_base_delay_above_max_delay() {
        let mut config = StrataConfig::default();
        config.producer.retry_base_delay_ms = 1000;
        config.producer.retry_max_delay_ms = 500;
        assert!(matches!(config.validate(), Err(TaskError::ConfigInvalid(_))));
    }
}
