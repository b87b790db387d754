use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use consilium_models::{MarketBriefingDocument, PipelineConfig, Stage, ThesisPair};
use consilium_store::CheckpointStore;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditRecorder, StageClock};
use crate::consensus::build_consensus;
use crate::debate::{DebateEngine, DebateError};
use crate::error::{AnalysisError, AnalysisFailure};
use crate::fusion::fuse;
use crate::orchestrator::{Orchestrator, OrchestratorError};
use crate::producer::{CritiqueProducer, MarketDataProvider, SignalProducer};
use crate::recommendation::recommend;
use crate::state::{AnalysisReport, RunState, StageDelta};
use crate::thesis::build_theses;

/// Audit history plus accumulated outputs of one in-flight run.
struct Run {
    recorder: AuditRecorder,
    state: RunState,
}

impl Run {
    fn run_id(&self) -> Uuid {
        self.state.run_id
    }

    /// Start a stage, or record it as cancelled if the caller already gave up.
    fn begin(&mut self, stage: Stage, cancel: &CancellationToken) -> Result<StageClock, AnalysisError> {
        let clock = StageClock::start();
        if cancel.is_cancelled() {
            return Err(self.fail(
                stage,
                clock,
                json!({ "cancelled": true }),
                vec![],
                AnalysisError::Cancelled { stage },
            ));
        }
        debug!(run_id = %self.run_id(), stage = %stage, "Stage started");
        Ok(clock)
    }

    fn succeed(
        &mut self,
        stage: Stage,
        clock: StageClock,
        payload: Value,
        errors: Vec<String>,
        delta: StageDelta,
    ) {
        self.recorder.record(stage, clock, true, payload, errors);
        self.state.apply(delta);
        info!(run_id = %self.run_id(), stage = %stage, "Stage complete");
    }

    fn fail(
        &mut self,
        stage: Stage,
        clock: StageClock,
        payload: Value,
        mut errors: Vec<String>,
        error: AnalysisError,
    ) -> AnalysisError {
        errors.push(error.to_string());
        self.recorder.record(stage, clock, false, payload, errors);
        if error.is_cancelled() {
            warn!(run_id = %self.run_id(), stage = %stage, "Run cancelled");
        } else {
            error!(run_id = %self.run_id(), stage = %stage, error = %error, "Stage failed");
        }
        error
    }
}

/// The full analysis chain for one market:
/// ingestion, signals, theses, debate, fusion, consensus, recommendation.
pub struct Pipeline {
    config: PipelineConfig,
    market_data: Arc<dyn MarketDataProvider>,
    orchestrator: Orchestrator,
    debate: Option<DebateEngine>,
    store: Option<Arc<dyn CheckpointStore>>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        market_data: Arc<dyn MarketDataProvider>,
        producers: Vec<Arc<dyn SignalProducer>>,
    ) -> Result<Self, AnalysisError> {
        let invalid = |reason: String| AnalysisError::InvalidConfiguration { reason };

        config.validate().map_err(|e| invalid(e.to_string()))?;
        if producers.is_empty() {
            return Err(invalid("at least one signal producer is required".to_string()));
        }
        let mut seen = HashSet::new();
        for producer in &producers {
            if !seen.insert(producer.name().to_string()) {
                return Err(invalid(format!(
                    "duplicate signal producer name '{}'",
                    producer.name()
                )));
            }
        }
        let required = config.orchestrator.min_agents_required;
        if required > producers.len() {
            return Err(invalid(format!(
                "min_agents_required {required} exceeds the {} configured producers",
                producers.len()
            )));
        }

        let orchestrator = Orchestrator::new(producers, config.orchestrator.clone());
        Ok(Self {
            config,
            market_data,
            orchestrator,
            debate: None,
            store: None,
        })
    }

    /// Enable the cross-examination stage.
    pub fn with_critic(mut self, critic: Arc<dyn CritiqueProducer>) -> Self {
        self.debate = Some(DebateEngine::new(critic, self.config.debate.clone()));
        self
    }

    /// Mirror every audit entry to `store` as it is recorded.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn producer_count(&self) -> usize {
        self.orchestrator.producer_count()
    }

    /// Analyze one market end to end.
    pub async fn analyze(
        &self,
        market_id: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, AnalysisFailure> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(run_id = %run_id, market_id, "Analysis started");

        let mut run = Run {
            recorder: AuditRecorder::new(run_id, self.store.clone()),
            state: RunState::new(run_id, market_id),
        };

        if let Err(error) = self.execute(&mut run, market_id, cancel).await {
            return Err(AnalysisFailure::new(run_id, error, run.recorder.into_log()));
        }

        match run.state.into_report(run.recorder.into_log()) {
            Ok(report) => {
                info!(
                    run_id = %run_id,
                    market_id,
                    action = ?report.recommendation.action,
                    consensus = report.consensus.consensus_probability,
                    regime = %report.consensus.regime,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Analysis complete"
                );
                Ok(report)
            }
            Err((missing, audit_log)) => Err(AnalysisFailure::new(
                run_id,
                AnalysisError::ConsensusUnavailable {
                    reason: format!("run finished without a {missing}"),
                },
                audit_log,
            )),
        }
    }

    async fn execute(
        &self,
        run: &mut Run,
        market_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AnalysisError> {
        let mbd = self.ingest(run, market_id, cancel).await?;
        self.collect_signals(run, &mbd, cancel).await?;
        let pair = self.construct_theses(run, &mbd, cancel)?;
        self.cross_examine(run, &mbd, &pair, cancel).await?;
        self.fuse_signals(run, cancel)?;
        self.reach_consensus(run, cancel)?;
        self.recommend(run, &mbd, cancel)
    }

    async fn ingest(
        &self,
        run: &mut Run,
        market_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<MarketBriefingDocument>, AnalysisError> {
        let stage = Stage::MarketIngestion;
        let clock = run.begin(stage, cancel)?;
        let unavailable = |reason: String| AnalysisError::MarketDataUnavailable {
            market_id: market_id.to_string(),
            reason,
        };

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.market_data.briefing(market_id) => Some(result),
        };
        let mbd = match fetched {
            None => {
                return Err(run.fail(
                    stage,
                    clock,
                    json!({ "market_id": market_id }),
                    vec![],
                    AnalysisError::Cancelled { stage },
                ))
            }
            Some(Err(e)) => {
                return Err(run.fail(
                    stage,
                    clock,
                    json!({ "market_id": market_id }),
                    vec![],
                    unavailable(e.to_string()),
                ))
            }
            Some(Ok(mbd)) => mbd,
        };

        if mbd.market_id != market_id {
            return Err(run.fail(
                stage,
                clock,
                json!({ "market_id": market_id, "briefing_market_id": mbd.market_id }),
                vec![],
                unavailable(format!("provider returned a briefing for '{}'", mbd.market_id)),
            ));
        }
        if let Err(problems) = mbd.validate() {
            let reason = problems.join("; ");
            return Err(run.fail(
                stage,
                clock,
                json!({ "market_id": market_id }),
                problems,
                unavailable(reason),
            ));
        }

        let payload = json!({
            "market_id": mbd.market_id,
            "event_type": mbd.event_type,
            "current_probability": mbd.current_probability,
            "liquidity_score": mbd.liquidity_score,
            "bid_ask_spread": mbd.bid_ask_spread,
            "volatility_regime": mbd.volatility_regime,
            "expiry_timestamp": mbd.expiry_timestamp,
            "ambiguity_flags": mbd.metadata.ambiguity_flags.len(),
            "key_catalysts": mbd.metadata.key_catalysts.len(),
        });
        let mbd = Arc::new(mbd);
        run.succeed(stage, clock, payload, vec![], StageDelta::Ingested(Arc::clone(&mbd)));
        Ok(mbd)
    }

    async fn collect_signals(
        &self,
        run: &mut Run,
        mbd: &Arc<MarketBriefingDocument>,
        cancel: &CancellationToken,
    ) -> Result<(), AnalysisError> {
        let stage = Stage::AgentSignals;
        let clock = run.begin(stage, cancel)?;
        let required = self.config.orchestrator.min_agents_required;

        match self.orchestrator.run(Arc::clone(mbd), run.run_id(), cancel).await {
            Ok(collection) => {
                let payload = collection.summary(required);
                let errors = collection
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.agent_name, e.message))
                    .collect();
                run.succeed(
                    stage,
                    clock,
                    payload,
                    errors,
                    StageDelta::SignalsCollected {
                        signals: collection.signals,
                        errors: collection.errors,
                    },
                );
                Ok(())
            }
            Err(OrchestratorError::InsufficientSignals {
                succeeded,
                required,
                collection,
            }) => {
                let payload = collection.summary(required);
                let errors = collection
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.agent_name, e.message))
                    .collect();
                run.state.apply(StageDelta::SignalsCollected {
                    signals: collection.signals,
                    errors: collection.errors,
                });
                Err(run.fail(
                    stage,
                    clock,
                    payload,
                    errors,
                    AnalysisError::InsufficientSignals {
                        succeeded,
                        required,
                    },
                ))
            }
            Err(OrchestratorError::Cancelled { collection }) => Err(run.fail(
                stage,
                clock,
                collection.summary(required),
                vec![],
                AnalysisError::Cancelled { stage },
            )),
        }
    }

    fn construct_theses(
        &self,
        run: &mut Run,
        mbd: &MarketBriefingDocument,
        cancel: &CancellationToken,
    ) -> Result<ThesisPair, AnalysisError> {
        let stage = Stage::ThesisConstruction;
        let clock = run.begin(stage, cancel)?;
        let pair = build_theses(&run.state.signals, mbd);

        let side = |t: &consilium_models::Thesis| {
            json!({
                "fair_probability": t.fair_probability,
                "confidence": t.confidence,
                "edge": t.edge,
                "basis": t.basis,
                "supporting_signals": t.supporting_signals,
            })
        };
        let payload = json!({
            "bull": side(&pair.bull),
            "bear": side(&pair.bear),
            "warnings": pair.warnings,
        });
        run.succeed(
            stage,
            clock,
            payload,
            pair.warnings.clone(),
            StageDelta::ThesesBuilt(pair.clone()),
        );
        Ok(pair)
    }

    async fn cross_examine(
        &self,
        run: &mut Run,
        mbd: &MarketBriefingDocument,
        pair: &ThesisPair,
        cancel: &CancellationToken,
    ) -> Result<(), AnalysisError> {
        let Some(engine) = &self.debate else {
            debug!(run_id = %run.run_id(), "No critic configured, skipping debate");
            return Ok(());
        };
        if self.config.debate.rounds == 0 {
            debug!(run_id = %run.run_id(), "Debate rounds set to 0, skipping debate");
            return Ok(());
        }

        let stage = Stage::CrossExamination;
        let clock = run.begin(stage, cancel)?;
        match engine.run(pair, mbd, run.run_id(), cancel).await {
            Ok(record) => {
                let payload = json!({
                    "rounds": self.config.debate.rounds,
                    "degraded": record.degraded,
                    "final_phase": record.final_phase,
                    "exchanges": record.exchanges,
                    "implied_probability": record.implied_probability(),
                });
                let errors = record.degradation_reason.iter().cloned().collect();
                run.succeed(stage, clock, payload, errors, StageDelta::Debated(record));
                Ok(())
            }
            Err(DebateError::Cancelled { phase }) => Err(run.fail(
                stage,
                clock,
                json!({ "phase": phase }),
                vec![],
                AnalysisError::Cancelled { stage },
            )),
        }
    }

    /// Fusion failure is recorded but not fatal here; consensus fails on it.
    fn fuse_signals(&self, run: &mut Run, cancel: &CancellationToken) -> Result<(), AnalysisError> {
        let stage = Stage::SignalFusion;
        let clock = run.begin(stage, cancel)?;

        match fuse(&run.state.signals, &self.config.fusion) {
            Ok(fused) => {
                let payload = serde_json::to_value(&fused).unwrap_or_default();
                run.succeed(stage, clock, payload, vec![], StageDelta::Fused(fused));
            }
            Err(e) => {
                warn!(run_id = %run.run_id(), error = %e, "Signal fusion failed");
                let payload = json!({ "signals": run.state.signals.len() });
                run.recorder.record(stage, clock, false, payload, vec![e.to_string()]);
                run.state.apply(StageDelta::FusionFailed(e));
            }
        }
        Ok(())
    }

    fn reach_consensus(&self, run: &mut Run, cancel: &CancellationToken) -> Result<(), AnalysisError> {
        let stage = Stage::Consensus;
        let clock = run.begin(stage, cancel)?;

        let result = build_consensus(
            run.state.fused.as_ref(),
            run.state.debate.as_ref(),
            &run.state.signals,
            &self.config.consensus,
        );
        match result {
            Ok(consensus) => {
                let payload = serde_json::to_value(&consensus).unwrap_or_default();
                run.succeed(stage, clock, payload, vec![], StageDelta::ConsensusReached(consensus));
                Ok(())
            }
            Err(e) => {
                let reason = match &run.state.fusion_error {
                    Some(cause) => format!("{e} ({cause})"),
                    None => e.to_string(),
                };
                Err(run.fail(
                    stage,
                    clock,
                    json!({ "fused": false }),
                    vec![],
                    AnalysisError::ConsensusUnavailable { reason },
                ))
            }
        }
    }

    fn recommend(
        &self,
        run: &mut Run,
        mbd: &MarketBriefingDocument,
        cancel: &CancellationToken,
    ) -> Result<(), AnalysisError> {
        let stage = Stage::Recommendation;
        let clock = run.begin(stage, cancel)?;

        let recommendation = match (&run.state.consensus, run.state.explanation_theses()) {
            (Some(consensus), Some((bull, bear))) => Some(recommend(
                consensus,
                mbd,
                bull,
                bear,
                &self.config.recommendation,
            )),
            _ => None,
        };
        let Some(recommendation) = recommendation else {
            return Err(run.fail(
                stage,
                clock,
                json!({}),
                vec![],
                AnalysisError::ConsensusUnavailable {
                    reason: "no consensus to recommend from".to_string(),
                },
            ));
        };

        let payload = json!({
            "action": recommendation.action,
            "edge": recommendation.metadata.edge,
            "expected_value": recommendation.expected_value,
            "win_probability": recommendation.win_probability,
            "liquidity_risk": recommendation.liquidity_risk,
            "entry_zone": recommendation.entry_zone,
            "target_zone": recommendation.target_zone,
        });
        run.succeed(
            stage,
            clock,
            payload,
            vec![],
            StageDelta::Recommended(recommendation),
        );
        Ok(())
    }
}
