use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use consilium_models::{AgentSignal, DebatePhase, MarketBriefingDocument, RefinedThesis, Thesis};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ProducerError;

/// Per-call context handed to producers and critics.
///
/// `cancel` is a child of the run's token. It fires on caller cancellation
/// and when the call's own deadline expires.
#[derive(Debug, Clone)]
pub struct ProducerContext {
    pub run_id: Uuid,
    pub cancel: CancellationToken,
    pub timeout: Duration,
}

/// Something that turns a market snapshot into a probability estimate.
#[async_trait]
pub trait SignalProducer: Send + Sync {
    fn name(&self) -> &str;

    async fn produce(
        &self,
        mbd: &MarketBriefingDocument,
        ctx: &ProducerContext,
    ) -> Result<AgentSignal, ProducerError>;
}

/// One debate phase as seen by the critic: refine `thesis` against `opposing`.
#[derive(Debug, Clone, Serialize)]
pub struct CritiqueRequest {
    pub market_id: String,
    pub question: String,
    pub market_probability: f64,
    pub phase: DebatePhase,
    pub round: u32,
    pub thesis: Thesis,
    pub opposing: Thesis,
}

#[async_trait]
pub trait CritiqueProducer: Send + Sync {
    fn name(&self) -> &str;

    async fn critique(
        &self,
        request: &CritiqueRequest,
        ctx: &ProducerContext,
    ) -> Result<RefinedThesis, ProducerError>;
}

/// Source of market briefings.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn briefing(&self, market_id: &str) -> Result<MarketBriefingDocument, ProducerError>;
}

/// Serves briefings held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    briefings: HashMap<String, MarketBriefingDocument>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_briefings(briefings: impl IntoIterator<Item = MarketBriefingDocument>) -> Self {
        let mut data = Self::new();
        for mbd in briefings {
            data.insert(mbd);
        }
        data
    }

    pub fn insert(&mut self, mbd: MarketBriefingDocument) {
        self.briefings.insert(mbd.market_id.clone(), mbd);
    }

    pub fn len(&self) -> usize {
        self.briefings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.briefings.is_empty()
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketData {
    async fn briefing(&self, market_id: &str) -> Result<MarketBriefingDocument, ProducerError> {
        self.briefings
            .get(market_id)
            .cloned()
            .ok_or_else(|| ProducerError::Unavailable(format!("no briefing for market {market_id}")))
    }
}
