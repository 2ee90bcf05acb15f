//! Logging System
//!
//! Structured logging on top of `tracing`. Level, format and destination come
//! from `LoggingConfig`; `CONTREE_LOG*` environment variables take precedence.
//!
//! | Variable              | Effect                                   |
//! |-----------------------|------------------------------------------|
//! | `CONTREE_LOG`         | Full `EnvFilter` directive string        |
//! | `CONTREE_LOG_MODULES` | Extra `module=level` pairs, comma-separated |
//! | `CONTREE_LOG_FORMAT`  | `text` or `json`                         |
//! | `CONTREE_LOG_OUTPUT`  | `stdout`, `stderr` or `file`             |

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration (`[logging]` table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error or off
    #[serde(default = "default_level")]
    pub level: String,

    /// text or json
    #[serde(default = "default_format")]
    pub format: String,

    /// stdout, stderr or file
    #[serde(default = "default_output")]
    pub output: String,

    /// Destination when `output = "file"`
    #[serde(default = "default_file")]
    pub file: PathBuf,

    /// ANSI colors for text output on a terminal stream
    #[serde(default = "default_color")]
    pub color: bool,

    /// Per-target levels, e.g. `contree::scheduler = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

fn default_file() -> PathBuf {
    PathBuf::from("contree.log")
}

fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
            output: default_output(),
            file: default_file(),
            color: default_color(),
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

impl Format {
    fn parse(value: &str) -> Result<Self, ApiError> {
        match value {
            "text" => Ok(Format::Text),
            "json" => Ok(Format::Json),
            other => Err(ApiError::ConfigError(format!(
                "Invalid log format '{}': expected text or json",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Stdout,
    Stderr,
    File,
}

impl Output {
    fn parse(value: &str) -> Result<Self, ApiError> {
        match value {
            "stdout" => Ok(Output::Stdout),
            "stderr" => Ok(Output::Stderr),
            "file" => Ok(Output::File),
            other => Err(ApiError::ConfigError(format!(
                "Invalid log output '{}': expected stdout, stderr or file",
                other
            ))),
        }
    }
}

/// Environment value if set, else the configured value, else `fallback`
fn setting(var: &str, configured: Option<&str>, fallback: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| configured.unwrap_or(fallback).to_string())
}

/// Install the global subscriber.
///
/// Fails if the configuration is invalid or a subscriber is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), ApiError> {
    let filter = build_filter(config)?;
    let format = Format::parse(&setting(
        "CONTREE_LOG_FORMAT",
        config.map(|c| c.format.as_str()),
        "text",
    ))?;
    let output = Output::parse(&setting(
        "CONTREE_LOG_OUTPUT",
        config.map(|c| c.output.as_str()),
        "stderr",
    ))?;

    let writer = match output {
        Output::Stdout => BoxMakeWriter::new(std::io::stdout),
        Output::Stderr => BoxMakeWriter::new(std::io::stderr),
        Output::File => {
            let path = config.map(|c| c.file.clone()).unwrap_or_else(default_file);
            BoxMakeWriter::new(open_log_file(&path)?)
        }
    };

    let layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(writer);

    let registry = Registry::default().with(filter);
    let installed = match format {
        Format::Json => registry.with(layer.json()).try_init(),
        Format::Text => {
            let color = config.map_or(true, |c| c.color) && output != Output::File;
            registry.with(layer.with_ansi(color)).try_init()
        }
    };
    installed.map_err(|e| ApiError::ConfigError(format!("Failed to install logger: {}", e)))
}

fn open_log_file(path: &Path) -> Result<Mutex<File>, ApiError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            ApiError::ConfigError(format!("Cannot create log directory {}: {}", dir.display(), e))
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(Mutex::new)
        .map_err(|e| ApiError::ConfigError(format!("Cannot open log file {}: {}", path.display(), e)))
}

fn build_filter(config: Option<&LoggingConfig>) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env("CONTREE_LOG") {
        return Ok(filter);
    }

    let level = config.map(|c| c.level.as_str()).unwrap_or("info");
    if level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let configured = config
        .into_iter()
        .flat_map(|c| c.modules.iter())
        .map(|(target, level)| (target.clone(), level.clone()));
    let from_env = std::env::var("CONTREE_LOG_MODULES")
        .map(|spec| parse_module_levels(&spec))
        .unwrap_or_default();

    configured
        .chain(from_env)
        .try_fold(EnvFilter::new(level), |filter, (target, level)| {
            Ok(filter.add_directive(module_directive(&target, &level)?))
        })
}

/// `a=debug, b = trace` into pairs; malformed entries are ignored
fn parse_module_levels(spec: &str) -> Vec<(String, String)> {
    spec.split(',')
        .filter_map(|entry| entry.split_once('='))
        .map(|(target, level)| (target.trim().to_string(), level.trim().to_string()))
        .filter(|(target, level)| !target.is_empty() && !level.is_empty())
        .collect()
}

fn module_directive(target: &str, level: &str) -> Result<Directive, ApiError> {
    format!("{}={}", target, level)
        .parse()
        .map_err(|e| ApiError::ConfigError(format!("Invalid log directive {}={}: {}", target, level, e)))
}
