//! TOML file sources.
//!
//! Global: `$XDG_CONFIG_HOME/contree/config.toml`, falling back to
//! `~/.config/contree/config.toml`.
//! Workspace: `<root>/config/config.toml`, then `<root>/config/<CONTREE_ENV>.toml`.

use config::builder::DefaultState;
use config::{ConfigBuilder, File};
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "contree";
const DEFAULT_ENV: &str = "development";

pub fn global_config_path() -> Option<PathBuf> {
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => PathBuf::from(std::env::var("HOME").ok()?).join(".config"),
    };
    Some(base.join(APP_DIR).join("config.toml"))
}

/// Workspace candidates in increasing precedence.
pub fn workspace_config_paths(workspace_root: &Path) -> [PathBuf; 2] {
    let dir = workspace_root.join("config");
    let env = std::env::var("CONTREE_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    [dir.join("config.toml"), dir.join(format!("{}.toml", env))]
}

/// Layer every existing file onto `builder`; later paths win.
pub fn layer<I>(builder: ConfigBuilder<DefaultState>, paths: I) -> ConfigBuilder<DefaultState>
where
    I: IntoIterator<Item = PathBuf>,
{
    paths.into_iter().fold(builder, |builder, path| {
        if path.is_file() {
            debug!(config_path = %path.display(), "Layering configuration file");
            builder.add_source(File::from(path).required(false))
        } else {
            builder
        }
    })
}
