use consilium_models::{AuditLog, Stage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failure of a single producer, critic or market-data call.
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Not available: {0}")]
    Unavailable(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    #[error("No signals to fuse")]
    NoSignals,

    #[error("No signal carries positive weight x confidence")]
    NoEffectiveWeight,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    #[error("Fused signal unavailable: {0}")]
    MissingFusedSignal(String),
}

/// Run-level failure. Every variant raised during a run names its stage.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisError {
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Market data unavailable for {market_id}: {reason}")]
    MarketDataUnavailable { market_id: String, reason: String },

    #[error("Insufficient signals: {succeeded} succeeded, {required} required")]
    InsufficientSignals { succeeded: usize, required: usize },

    #[error("Consensus unavailable: {reason}")]
    ConsensusUnavailable { reason: String },

    #[error("Run cancelled during {stage}")]
    Cancelled { stage: Stage },
}

impl AnalysisError {
    /// The stage the run failed in. None for construction-time errors.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AnalysisError::InvalidConfiguration { .. } => None,
            AnalysisError::MarketDataUnavailable { .. } => Some(Stage::MarketIngestion),
            AnalysisError::InsufficientSignals { .. } => Some(Stage::AgentSignals),
            AnalysisError::ConsensusUnavailable { .. } => Some(Stage::Consensus),
            AnalysisError::Cancelled { stage } => Some(*stage),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AnalysisError::Cancelled { .. })
    }
}

/// A failed run: the error plus whatever audit history was recorded.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[error("run {run_id} failed: {error}")]
pub struct AnalysisFailure {
    pub run_id: Uuid,
    pub stage: Option<Stage>,
    pub error: AnalysisError,
    pub audit_log: AuditLog,
}

impl AnalysisFailure {
    pub fn new(run_id: Uuid, error: AnalysisError, audit_log: AuditLog) -> Self {
        Self {
            run_id,
            stage: error.stage(),
            error,
            audit_log,
        }
    }
}
