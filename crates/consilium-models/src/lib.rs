pub mod agent_signal;
pub mod audit;
pub mod config;
pub mod consensus;
pub mod market_briefing;
pub mod recommendation;
pub mod thesis;

pub use agent_signal::{is_unit_interval, AgentError, AgentErrorKind, AgentSignal, Direction};
pub use audit::{AuditEntry, AuditLog, AuditLogError, Stage};
pub use config::{
    AgentsConfig, AuditConfig, ConfigError, ConsensusConfig, ConsiliumConfig, CriticConfig,
    DebateConfig, FusionConfig, LiquidityCutoffs, OrchestratorConfig, PipelineConfig,
    ProducerConfig, RecommendationConfig,
};
pub use consensus::{
    clamp_unit, ConsensusProbability, FusedSignal, ProbabilityRange, Regime, SignalConflict,
};
pub use market_briefing::{
    BriefingMetadata, EventType, KeyCatalyst, MarketBriefingDocument, VolatilityRegime,
};
pub use recommendation::{
    Explanation, LiquidityRisk, RecommendationMetadata, TradeAction, TradeRecommendation,
};
pub use thesis::{
    DebateExchange, DebatePhase, DebateRecord, RefinedThesis, Thesis, ThesisBasis, ThesisPair,
};
