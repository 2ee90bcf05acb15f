//! CLI presentation: text and JSON rendering of simulation results.

use crate::continuation::{ContinuationInfo, RegistryMetricsSnapshot, SweepReport};
use crate::error::ApiError;
use crate::scheduler::SchedulerStats;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde::Serialize;

/// Everything `contree simulate` reports
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub created: usize,
    pub invalidated: usize,
    pub disposed: usize,
    pub sweep: SweepReport,
    pub metrics: RegistryMetricsSnapshot,
    pub scheduler: SchedulerStats,
    pub continuations: Vec<ContinuationInfo>,
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

pub fn format_simulation_table(summary: &SimulationSummary) -> String {
    let mut out = String::new();

    if summary.continuations.is_empty() {
        out.push_str("No live continuations.\n\n");
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec![
            "Id", "Parent", "Children", "Scope", "Session", "Expires", "Sweepable",
        ]);
        for info in &summary.continuations {
            table.add_row(vec![
                short_id(info.id.as_str()),
                info.parent_id
                    .as_ref()
                    .map(|p| short_id(p.as_str()))
                    .unwrap_or_else(|| "-".to_string()),
                info.child_ids.len().to_string(),
                info.scope_tag.clone(),
                info.session_id
                    .as_ref()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                info.expires_at.format("%H:%M:%S%.3f").to_string(),
                if info.expiration_tracked { "yes" } else { "no" }.to_string(),
            ]);
        }
        out.push_str(&format!("{}\n\n", table));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Counter", "Value"]);
    let m = &summary.metrics;
    let rows: [(&str, u64); 11] = [
        ("created", summary.created as u64),
        ("invalidated", summary.invalidated as u64),
        ("disposed", summary.disposed as u64),
        ("swept (expired)", summary.sweep.expired as u64),
        ("swept (pruned ancestors)", summary.sweep.pruned_ancestors as u64),
        ("live", m.live),
        ("expired (total)", m.expired),
        ("disposer failures", m.disposer_failures),
        ("tasks pending", summary.scheduler.pending as u64),
        ("tasks dispatched", summary.scheduler.dispatched),
        ("tasks failed", summary.scheduler.failed),
    ];
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value.to_string()]);
    }
    out.push_str(&format!("{}", table));
    out
}

pub fn format_simulation_json(summary: &SimulationSummary) -> Result<String, ApiError> {
    serde_json::to_string_pretty(summary)
        .map_err(|e| ApiError::ConfigError(format!("Failed to serialize summary: {}", e)))
}
