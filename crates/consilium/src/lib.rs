//! Consilium - multi-agent probability analysis for prediction markets
//!
//! Runs a market briefing through independent Claude CLI signal producers,
//! builds bull and bear theses, cross-examines them, fuses the signals into a
//! banded consensus and derives a trade recommendation with a full audit trail.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use consilium::agents::{Pipeline, StaticMarketData};
//! use consilium::models::{ConsiliumConfig, MarketBriefingDocument};
//! use consilium::store::SqliteCheckpointStore;
//! ```

pub use consilium_agents as agents;
pub use consilium_models as models;
pub use consilium_store as store;

use std::sync::Arc;

use anyhow::Context;
use consilium_agents::{
    AnalysisFailure, AnalysisReport, ClaudeCritic, ClaudeSignalProducer, CritiqueProducer,
    MarketDataProvider, Pipeline, SignalProducer,
};
use consilium_models::ConsiliumConfig;
use consilium_store::SqliteCheckpointStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Claude-backed producers for every enabled `[[agents.producers]]` entry.
pub fn build_producers(config: &ConsiliumConfig) -> Vec<Arc<dyn SignalProducer>> {
    config
        .agents
        .enabled_producers()
        .map(|p| {
            let model = p
                .model
                .clone()
                .unwrap_or_else(|| config.agents.default_model.clone());
            Arc::new(ClaudeSignalProducer::new(
                p.name.clone(),
                p.instructions.clone(),
                model,
            )) as Arc<dyn SignalProducer>
        })
        .collect()
}

/// The critic from `[agents.critic]`, if configured and enabled.
pub fn build_critic(config: &ConsiliumConfig) -> Option<Arc<dyn CritiqueProducer>> {
    let critic = config.agents.critic.as_ref().filter(|c| c.enabled)?;
    let model = critic
        .model
        .clone()
        .unwrap_or_else(|| config.agents.default_model.clone());
    Some(Arc::new(ClaudeCritic::new(critic.instructions.clone(), model)) as Arc<dyn CritiqueProducer>)
}

/// Build a Pipeline from configuration.
pub fn build_pipeline(
    config: &ConsiliumConfig,
    market_data: Arc<dyn MarketDataProvider>,
) -> Result<Pipeline, anyhow::Error> {
    config.validate()?;

    let mut pipeline = Pipeline::new(config.pipeline.clone(), market_data, build_producers(config))?;
    if let Some(critic) = build_critic(config) {
        pipeline = pipeline.with_critic(critic);
    }
    if let Some(path) = &config.audit.sqlite_path {
        let store = SqliteCheckpointStore::open(path)
            .with_context(|| format!("Failed to open audit store: {path}"))?;
        info!(path = %path, "Mirroring audit entries to SQLite");
        pipeline = pipeline.with_checkpoint_store(Arc::new(store));
    }
    Ok(pipeline)
}

/// Analyze one market with the given pipeline.
pub async fn analyze(
    pipeline: &Pipeline,
    market_id: &str,
    cancel: &CancellationToken,
) -> Result<AnalysisReport, AnalysisFailure> {
    pipeline.analyze(market_id, cancel).await
}
