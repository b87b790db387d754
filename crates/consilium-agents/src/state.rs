use std::sync::Arc;

use consilium_models::{
    AgentError, AgentSignal, AuditLog, ConsensusProbability, DebateRecord, FusedSignal,
    MarketBriefingDocument, Thesis, ThesisPair, TradeRecommendation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FusionError;

/// The successful outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub market_id: String,
    pub recommendation: TradeRecommendation,
    pub consensus: ConsensusProbability,
    pub fused: FusedSignal,
    pub theses: ThesisPair,
    /// None when the debate was skipped.
    pub debate: Option<DebateRecord>,
    pub signals: Vec<AgentSignal>,
    pub agent_errors: Vec<AgentError>,
    pub audit_log: AuditLog,
}

/// Output of one stage, merged into [`RunState`] by [`RunState::apply`].
#[derive(Debug, Clone)]
pub enum StageDelta {
    Ingested(Arc<MarketBriefingDocument>),
    SignalsCollected {
        signals: Vec<AgentSignal>,
        errors: Vec<AgentError>,
    },
    ThesesBuilt(ThesisPair),
    Debated(DebateRecord),
    Fused(FusedSignal),
    FusionFailed(FusionError),
    ConsensusReached(ConsensusProbability),
    Recommended(TradeRecommendation),
}

/// Everything a run has produced so far.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: Uuid,
    pub market_id: String,
    pub briefing: Option<Arc<MarketBriefingDocument>>,
    pub signals: Vec<AgentSignal>,
    pub agent_errors: Vec<AgentError>,
    pub theses: Option<ThesisPair>,
    pub debate: Option<DebateRecord>,
    pub fused: Option<FusedSignal>,
    pub fusion_error: Option<FusionError>,
    pub consensus: Option<ConsensusProbability>,
    pub recommendation: Option<TradeRecommendation>,
}

impl RunState {
    pub fn new(run_id: Uuid, market_id: &str) -> Self {
        Self {
            run_id,
            market_id: market_id.to_string(),
            briefing: None,
            signals: Vec::new(),
            agent_errors: Vec::new(),
            theses: None,
            debate: None,
            fused: None,
            fusion_error: None,
            consensus: None,
            recommendation: None,
        }
    }

    pub fn apply(&mut self, delta: StageDelta) {
        match delta {
            StageDelta::Ingested(mbd) => self.briefing = Some(mbd),
            StageDelta::SignalsCollected { signals, errors } => {
                self.signals = signals;
                self.agent_errors = errors;
            }
            StageDelta::ThesesBuilt(pair) => self.theses = Some(pair),
            StageDelta::Debated(record) => self.debate = Some(record),
            StageDelta::Fused(fused) => {
                self.fused = Some(fused);
                self.fusion_error = None;
            }
            StageDelta::FusionFailed(e) => {
                self.fused = None;
                self.fusion_error = Some(e);
            }
            StageDelta::ConsensusReached(c) => self.consensus = Some(c),
            StageDelta::Recommended(r) => self.recommendation = Some(r),
        }
    }

    /// Bull and bear theses to explain a recommendation with: the refined
    /// pair after a clean debate, the originals otherwise.
    pub fn explanation_theses(&self) -> Option<(&Thesis, &Thesis)> {
        match (&self.debate, &self.theses) {
            (Some(debate), _) if !debate.degraded => {
                Some((&debate.refined_bull, &debate.refined_bear))
            }
            (_, Some(pair)) => Some((&pair.bull, &pair.bear)),
            (_, None) => None,
        }
    }

    /// Assemble the final report. Errors with the name of the first missing
    /// output, handing the audit log back.
    pub fn into_report(self, audit_log: AuditLog) -> Result<AnalysisReport, (&'static str, AuditLog)> {
        let Some(recommendation) = self.recommendation else {
            return Err(("recommendation", audit_log));
        };
        let Some(consensus) = self.consensus else {
            return Err(("consensus", audit_log));
        };
        let Some(fused) = self.fused else {
            return Err(("fused signal", audit_log));
        };
        let Some(theses) = self.theses else {
            return Err(("theses", audit_log));
        };

        Ok(AnalysisReport {
            run_id: self.run_id,
            market_id: self.market_id,
            recommendation,
            consensus,
            fused,
            theses,
            debate: self.debate,
            signals: self.signals,
            agent_errors: self.agent_errors,
            audit_log,
        })
    }
}
