//! Config loading facade: merges sources in precedence order and deserializes.

use super::merge::merge_policy;
use super::sources::{environment, files};
use super::ContreeConfig;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};

/// Loads `ContreeConfig` from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace root.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace files, environment.
    pub fn load(workspace_root: &Path) -> Result<ContreeConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = files::layer(builder, files::global_config_path());
        let builder = files::layer(builder, files::workspace_config_paths(workspace_root));
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Load configuration from a single file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<ContreeConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true))
            .build()?
            .try_deserialize()
    }

    /// Path of the global config file, if a home directory is known.
    pub fn global_config_path() -> Option<PathBuf> {
        files::global_config_path()
    }

    /// Built-in defaults without consulting any source.
    pub fn default() -> ContreeConfig {
        ContreeConfig::default()
    }
}
