//! CLI domain: parse, route and presentation for the `contree` binary.

mod parse;
mod presentation;
mod route;

pub use parse::{Cli, Commands, ConfigFormat, ListingFormat};
pub use presentation::{format_simulation_json, format_simulation_table, SimulationSummary};
pub use route::{RunContext, SimulationRequest};

use crate::error::ApiError;

/// Render an error for the terminal
pub fn map_error(e: &ApiError) -> String {
    format!("Error: {}", e)
}
