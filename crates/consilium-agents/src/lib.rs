pub mod audit;
pub mod claude;
pub mod claude_cli;
pub mod consensus;
pub mod debate;
pub mod error;
pub mod fusion;
pub mod orchestrator;
pub mod parser;
pub mod pipeline;
pub mod producer;
pub mod prompts;
pub mod recommendation;
pub mod state;
pub mod thesis;

pub mod test_support;

pub use audit::{sanitize, AuditRecorder};
pub use claude::{ClaudeCritic, ClaudeSignalProducer};
pub use debate::DebateEngine;
pub use error::{AnalysisError, AnalysisFailure, ProducerError};
pub use orchestrator::{Orchestrator, SignalCollection};
pub use pipeline::Pipeline;
pub use producer::{
    CritiqueProducer, CritiqueRequest, MarketDataProvider, ProducerContext, SignalProducer,
    StaticMarketData,
};
pub use state::{AnalysisReport, RunState, StageDelta};
