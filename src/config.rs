//! Configuration System
//!
//! Layered configuration for the continuation manager and the task scheduler.
//! Values come from built-in defaults, the global config file, workspace config
//! files and `CONTREE__*` environment variables, in increasing precedence.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Name of the pool that is always present.
pub const DEFAULT_POOL: &str = "default";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContreeConfig {
    /// Continuation lifecycle settings
    #[serde(default)]
    pub continuations: ContinuationsConfig,

    /// Scheduler pools
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Continuation lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationsConfig {
    /// TTL applied when a continuation is created with a zero TTL
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Delay before the first expiration sweep
    #[serde(default = "default_sweep_ms")]
    pub sweep_offset_ms: u64,

    /// Interval between expiration sweeps
    #[serde(default = "default_sweep_ms")]
    pub sweep_period_ms: u64,

    /// One holder per client session instead of a single global holder
    #[serde(default)]
    pub session_bound: bool,

    /// Return continuations even when the scope tag does not match.
    ///
    /// Enabling this removes the isolation between flows: any flow can resume
    /// a continuation created by another one.
    #[serde(default)]
    pub legacy_scope_compat: bool,

    /// Successful lookups extend the continuation's lifetime
    #[serde(default)]
    pub refresh_on_lookup: bool,

    /// Random bytes per identifier (hex-encoded to twice as many characters)
    #[serde(default = "default_id_bytes")]
    pub id_bytes: usize,

    /// Pool the expiration sweep runs on
    #[serde(default = "default_pool_name")]
    pub sweep_pool: String,
}

fn default_ttl_ms() -> u64 {
    60 * 60 * 1000
}

fn default_sweep_ms() -> u64 {
    3 * 60 * 1000
}

fn default_id_bytes() -> usize {
    20
}

fn default_pool_name() -> String {
    DEFAULT_POOL.to_string()
}

impl Default for ContinuationsConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: default_ttl_ms(),
            sweep_offset_ms: default_sweep_ms(),
            sweep_period_ms: default_sweep_ms(),
            session_bound: false,
            legacy_scope_compat: false,
            refresh_on_lookup: false,
            id_bytes: default_id_bytes(),
            sweep_pool: default_pool_name(),
        }
    }
}

impl ContinuationsConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_offset(&self) -> Duration {
        Duration::from_millis(self.sweep_offset_ms)
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_millis(self.sweep_period_ms)
    }

    /// Validate continuation settings, reporting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let problems: Vec<String> = [
            ("default_ttl_ms", self.default_ttl_ms == 0),
            ("sweep_period_ms", self.sweep_period_ms == 0),
            ("id_bytes", self.id_bytes == 0),
        ]
        .into_iter()
        .filter(|(_, zero)| *zero)
        .map(|(field, _)| format!("{} must be greater than zero", field))
        .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

/// Queueing policy of a worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    Unbounded,
    Bounded(usize),
}

/// Worker pool sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Core runtime threads of the pool, started eagerly
    #[serde(default = "default_min_threads")]
    pub min_threads: usize,

    /// Upper bound on jobs running at once
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Idle time after which a job thread exits
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,

    /// Jobs allowed to wait beyond the running ones; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
}

fn default_min_threads() -> usize {
    1
}

fn default_max_threads() -> usize {
    4
}

fn default_keep_alive_ms() -> u64 {
    60 * 1000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_threads: default_min_threads(),
            max_threads: default_max_threads(),
            keep_alive_ms: default_keep_alive_ms(),
            queue_capacity: None,
        }
    }
}

impl PoolConfig {
    pub fn queue_policy(&self) -> QueuePolicy {
        match self.queue_capacity {
            Some(capacity) => QueuePolicy::Bounded(capacity),
            None => QueuePolicy::Unbounded,
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }

    /// Validate pool sizing
    pub fn validate(&self) -> Result<(), String> {
        if self.max_threads == 0 {
            return Err("max_threads must be greater than zero".to_string());
        }
        if self.min_threads > self.max_threads {
            return Err(format!(
                "min_threads ({}) exceeds max_threads ({})",
                self.min_threads, self.max_threads
            ));
        }
        if self.queue_capacity == Some(0) {
            return Err("queue_capacity must be greater than zero when set".to_string());
        }
        Ok(())
    }
}

/// Scheduler configuration: named pools plus the fallback pool name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pool used when a task names an unknown pool
    #[serde(default = "default_pool_name")]
    pub default_pool: String,

    /// Named pools
    #[serde(default)]
    pub pools: HashMap<String, PoolConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let mut pools = HashMap::new();
        pools.insert(DEFAULT_POOL.to_string(), PoolConfig::default());
        Self {
            default_pool: default_pool_name(),
            pools,
        }
    }
}

impl SchedulerConfig {
    /// True if `name` resolves to a configured pool (the default pool always does)
    pub fn has_pool(&self, name: &str) -> bool {
        name == self.default_pool || self.pools.contains_key(name)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Continuations(String),
    Pool(String, String),
    Scheduler(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Continuations(msg) => write!(f, "Continuations: {}", msg),
            ValidationError::Pool(name, msg) => write!(f, "Pool '{}': {}", name, msg),
            ValidationError::Scheduler(msg) => write!(f, "Scheduler: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ContreeConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(problems) = self.continuations.validate() {
            errors.extend(problems.into_iter().map(ValidationError::Continuations));
        }

        for (name, pool) in &self.scheduler.pools {
            if let Err(e) = pool.validate() {
                errors.push(ValidationError::Pool(name.clone(), e));
            }
        }

        if self.scheduler.default_pool.trim().is_empty() {
            errors.push(ValidationError::Scheduler(
                "default_pool cannot be empty".to_string(),
            ));
        }

        if !self.scheduler.has_pool(&self.continuations.sweep_pool) {
            errors.push(ValidationError::Continuations(format!(
                "sweep_pool '{}' is not a configured pool",
                self.continuations.sweep_pool
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all errors into a single `ApiError`
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}
