//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// The default pool is seeded here so that a file declaring only extra pools
/// still keeps it after merging.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("scheduler.default_pool", crate::config::DEFAULT_POOL)?
        .set_default("scheduler.pools.default.min_threads", 1)?
        .set_default("scheduler.pools.default.max_threads", 4)?
        .set_default("scheduler.pools.default.keep_alive_ms", 60_000)
}
