//! CLI route: run context and command dispatch.

use crate::cli::parse::{Commands, ConfigFormat, ListingFormat};
use crate::cli::presentation::{format_simulation_json, format_simulation_table, SimulationSummary};
use crate::config::{ConfigLoader, ContreeConfig};
use crate::continuation::{Continuation, ContinuationsManager, NewContinuation};
use crate::error::ApiError;
use crate::scheduler::Scheduler;
use crate::types::SessionId;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Parameters of `contree simulate`
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub flows: usize,
    pub depth: usize,
    pub ttl_ms: u64,
    pub sessions: usize,
    pub wait_ms: u64,
    pub sweep_period_ms: Option<u64>,
    pub invalidate_odd: bool,
}

/// Runtime context for CLI execution: the loaded, validated configuration.
pub struct RunContext {
    config: ContreeConfig,
}

impl RunContext {
    /// Load configuration from `config_path`, or the layered sources of `workspace_root`.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(&path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self {
            config: config.validated()?,
        })
    }

    pub fn from_config(config: ContreeConfig) -> Result<Self, ApiError> {
        Ok(Self {
            config: config.validated()?,
        })
    }

    pub fn config(&self) -> &ContreeConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Config { format } => self.render_config(*format),
            Commands::Simulate {
                flows,
                depth,
                ttl_ms,
                sessions,
                wait_ms,
                sweep_period_ms,
                invalidate_odd,
                format,
            } => {
                let summary = self.simulate(&SimulationRequest {
                    flows: *flows,
                    depth: *depth,
                    ttl_ms: *ttl_ms,
                    sessions: *sessions,
                    wait_ms: *wait_ms,
                    sweep_period_ms: *sweep_period_ms,
                    invalidate_odd: *invalidate_odd,
                })?;
                match format {
                    ListingFormat::Table => Ok(format_simulation_table(&summary)),
                    ListingFormat::Json => format_simulation_json(&summary),
                }
            }
        }
    }

    fn render_config(&self, format: ConfigFormat) -> Result<String, ApiError> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(&self.config)
                .map_err(|e| ApiError::ConfigError(format!("Failed to render TOML: {}", e))),
            ConfigFormat::Json => serde_json::to_string_pretty(&self.config)
                .map_err(|e| ApiError::ConfigError(format!("Failed to render JSON: {}", e))),
        }
    }

    /// Drive a scheduler and manager through a synthetic workload.
    pub fn simulate(&self, request: &SimulationRequest) -> Result<SimulationSummary, ApiError> {
        let mut continuations = self.config.continuations.clone();
        continuations.session_bound = request.sessions > 0;
        if let Some(period) = request.sweep_period_ms {
            continuations.sweep_offset_ms = period;
            continuations.sweep_period_ms = period;
        }
        continuations
            .validate()
            .map_err(|problems| ApiError::ConfigError(problems.join("; ")))?;

        let scheduler = Scheduler::new(&self.config.scheduler)?;
        let manager: Arc<ContinuationsManager<String>> =
            Arc::new(ContinuationsManager::new(continuations));
        manager.start(&scheduler);

        let disposed = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_millis(request.ttl_ms);
        let mut created = 0;
        let mut roots = Vec::with_capacity(request.flows);

        for flow in 0..request.flows {
            let session = (request.sessions > 0)
                .then(|| SessionId::new(format!("session-{}", flow % request.sessions)));
            let scope_tag = format!("flow-{}", flow);
            let mut parent: Option<Arc<Continuation<String>>> = None;

            for step in 0..request.depth.max(1) {
                let counter = Arc::clone(&disposed);
                let mut new = NewContinuation::new(format!("{}/step-{}", scope_tag, step), scope_tag.clone())
                    .time_to_live(ttl)
                    .disposer(move |_: &Continuation<String>| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        Ok(())
                    });
                new = match (&parent, &session) {
                    (Some(parent), _) => new.parent(parent),
                    (None, Some(session)) => new.session(session.clone()),
                    (None, None) => new,
                };
                let node = manager.create(new)?;
                created += 1;
                if parent.is_none() {
                    roots.push(Arc::clone(&node));
                }
                parent = Some(node);
            }
        }

        let mut invalidated = 0;
        if request.invalidate_odd {
            for root in roots.iter().skip(1).step_by(2) {
                invalidated += manager.invalidate(root)?;
            }
        }

        if request.wait_ms > 0 {
            std::thread::sleep(Duration::from_millis(request.wait_ms));
        }
        let sweep = manager.sweep();
        manager.stop(&scheduler);

        let summary = SimulationSummary {
            created,
            invalidated,
            disposed: disposed.load(Ordering::Relaxed),
            sweep,
            metrics: manager.metrics(),
            scheduler: scheduler.stats(),
            continuations: manager.list_all(),
        };
        scheduler.shutdown();

        info!(
            created = summary.created,
            invalidated = summary.invalidated,
            disposed = summary.disposed,
            live = summary.metrics.live,
            "Simulation finished"
        );
        Ok(summary)
    }
}
