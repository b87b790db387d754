use std::sync::Arc;
use std::time::{Duration, Instant};

use consilium_models::{
    clamp_unit, DebateConfig, DebateExchange, DebatePhase, DebateRecord,
    Direction, MarketBriefingDocument, RefinedThesis, Thesis, ThesisPair,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ProducerError;
use crate::producer::{CritiqueProducer, CritiqueRequest, ProducerContext};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DebateError {
    #[error("debate cancelled during {phase:?}")]
    Cancelled { phase: DebatePhase },
}

/// Position in the debate: the phase plus its rebuttal round (0 for the opening).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebateState {
    pub phase: DebatePhase,
    pub round: u32,
}

impl DebateState {
    pub const START: DebateState = DebateState {
        phase: DebatePhase::Init,
        round: 0,
    };

    /// The transition function. `Resolved` is terminal.
    pub fn next(self, rounds: u32) -> DebateState {
        let (phase, round) = match self.phase {
            DebatePhase::Init => (DebatePhase::BullOpening, 0),
            DebatePhase::BullOpening if rounds == 0 => (DebatePhase::Resolved, 0),
            DebatePhase::BullOpening => (DebatePhase::BearRebuttal, 1),
            DebatePhase::BearRebuttal => (DebatePhase::BullRebuttal, self.round),
            DebatePhase::BullRebuttal if self.round < rounds => {
                (DebatePhase::BearRebuttal, self.round + 1)
            }
            DebatePhase::BullRebuttal | DebatePhase::Resolved => (DebatePhase::Resolved, self.round),
        };
        DebateState { phase, round }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == DebatePhase::Resolved
    }
}

/// The full phase sequence for `rounds`, from `Init` to `Resolved` inclusive.
pub fn phase_sequence(rounds: u32) -> Vec<DebatePhase> {
    let mut state = DebateState::START;
    let mut phases = vec![state.phase];
    while !state.is_terminal() {
        state = state.next(rounds);
        phases.push(state.phase);
    }
    phases
}

/// Apply a critic's refinement to a working thesis. Direction, basis and
/// support never change; probabilities are clamped and edge recomputed.
pub fn apply_refinement(thesis: &Thesis, refined: RefinedThesis, market: f64) -> Thesis {
    let fair_probability = clamp_unit(refined.fair_probability);
    Thesis {
        direction: thesis.direction,
        fair_probability,
        confidence: clamp_unit(refined.confidence),
        edge: fair_probability - market,
        supporting_signals: thesis.supporting_signals.clone(),
        basis: thesis.basis,
        core_argument: if refined.core_argument.trim().is_empty() {
            thesis.core_argument.clone()
        } else {
            refined.core_argument
        },
        catalysts: if refined.catalysts.is_empty() {
            thesis.catalysts.clone()
        } else {
            refined.catalysts
        },
        failure_conditions: if refined.failure_conditions.is_empty() {
            thesis.failure_conditions.clone()
        } else {
            refined.failure_conditions
        },
    }
}

/// Sequential bull/bear cross-examination.
pub struct DebateEngine {
    critic: Arc<dyn CritiqueProducer>,
    config: DebateConfig,
}

impl DebateEngine {
    pub fn new(critic: Arc<dyn CritiqueProducer>, config: DebateConfig) -> Self {
        Self { critic, config }
    }

    /// Run every phase in order. A failed or timed-out phase degrades the
    /// record; only caller cancellation is an error.
    pub async fn run(
        &self,
        theses: &ThesisPair,
        mbd: &MarketBriefingDocument,
        run_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<DebateRecord, DebateError> {
        let market = mbd.current_probability;
        let round_timeout = Duration::from_millis(self.config.round_timeout_ms);
        let mut bull = theses.bull.clone();
        let mut bear = theses.bear.clone();
        let mut exchanges = Vec::new();
        let mut state = DebateState::START.next(self.config.rounds);

        info!(run_id = %run_id, critic = %self.critic.name(), rounds = self.config.rounds, "Debate started");

        while !state.is_terminal() {
            let speaking_bull = state.phase.speaker() == Some(Direction::Yes);
            let (thesis, opposing) = if speaking_bull {
                (&bull, &bear)
            } else {
                (&bear, &bull)
            };
            let request = CritiqueRequest {
                market_id: mbd.market_id.clone(),
                question: mbd.question.clone(),
                market_probability: market,
                phase: state.phase,
                round: state.round,
                thesis: thesis.clone(),
                opposing: opposing.clone(),
            };
            let probability_before = thesis.fair_probability;

            let child = cancel.child_token();
            let ctx = ProducerContext {
                run_id,
                cancel: child.clone(),
                timeout: round_timeout,
            };
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(run_id = %run_id, phase = ?state.phase, "Debate cancelled");
                    return Err(DebateError::Cancelled { phase: state.phase });
                }
                result = tokio::time::timeout(round_timeout, self.critic.critique(&request, &ctx)) => {
                    result.unwrap_or_else(|_| {
                        child.cancel();
                        Err(ProducerError::Timeout(round_timeout.as_millis() as u64))
                    })
                }
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let refined = match result {
                Ok(refined)
                    if refined.fair_probability.is_finite() && refined.confidence.is_finite() =>
                {
                    refined
                }
                Ok(refined) => {
                    return Ok(self.degraded(
                        theses,
                        state.phase,
                        exchanges,
                        format!(
                            "critic returned non-finite values in {:?}: p={} c={}",
                            state.phase, refined.fair_probability, refined.confidence
                        ),
                    ));
                }
                Err(ProducerError::Cancelled) if cancel.is_cancelled() => {
                    return Err(DebateError::Cancelled { phase: state.phase });
                }
                Err(e) => {
                    return Ok(self.degraded(
                        theses,
                        state.phase,
                        exchanges,
                        format!("{:?} failed: {e}", state.phase),
                    ));
                }
            };

            let updated = apply_refinement(thesis, refined, market);
            debug!(
                phase = ?state.phase,
                round = state.round,
                before = probability_before,
                after = updated.fair_probability,
                elapsed_ms,
                "Debate phase complete"
            );
            exchanges.push(DebateExchange {
                round: state.round,
                phase: state.phase,
                probability_before,
                probability_after: updated.fair_probability,
                elapsed_ms,
            });
            if speaking_bull {
                bull = updated;
            } else {
                bear = updated;
            }

            state = state.next(self.config.rounds);
        }

        info!(
            run_id = %run_id,
            bull = bull.fair_probability,
            bear = bear.fair_probability,
            phases = exchanges.len(),
            "Debate resolved"
        );

        Ok(DebateRecord {
            original_bull: theses.bull.clone(),
            original_bear: theses.bear.clone(),
            refined_bull: bull,
            refined_bear: bear,
            degraded: false,
            degradation_reason: None,
            final_phase: DebatePhase::Resolved,
            exchanges,
        })
    }

    fn degraded(
        &self,
        theses: &ThesisPair,
        phase: DebatePhase,
        exchanges: Vec<DebateExchange>,
        reason: String,
    ) -> DebateRecord {
        warn!(critic = %self.critic.name(), phase = ?phase, reason = %reason, "Debate degraded");
        DebateRecord {
            original_bull: theses.bull.clone(),
            original_bear: theses.bear.clone(),
            refined_bull: theses.bull.clone(),
            refined_bear: theses.bear.clone(),
            degraded: true,
            degradation_reason: Some(reason),
            final_phase: phase,
            exchanges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_briefing, signal, ScriptedCritic};
    use crate::thesis::build_theses;

    fn theses() -> (ThesisPair, MarketBriefingDocument) {
        let mbd = sample_briefing("m", 0.5);
        let pair = build_theses(
            &[
                signal("a", Direction::Yes, 0.7, 0.8),
                signal("b", Direction::No, 0.3, 0.8),
            ],
            &mbd,
        );
        (pair, mbd)
    }

    fn config(rounds: u32, round_timeout_ms: u64) -> DebateConfig {
        DebateConfig {
            rounds,
            round_timeout_ms,
        }
    }

    #[test]
    fn default_round_sequence() {
        assert_eq!(
            phase_sequence(1),
            vec![
                DebatePhase::Init,
                DebatePhase::BullOpening,
                DebatePhase::BearRebuttal,
                DebatePhase::BullRebuttal,
                DebatePhase::Resolved,
            ]
        );
    }

    #[test]
    fn multi_round_sequence_repeats_rebuttals() {
        let phases = phase_sequence(3);
        assert_eq!(phases.len(), 2 + 1 + 3 * 2);
        assert_eq!(phases.last(), Some(&DebatePhase::Resolved));
        assert_eq!(phase_sequence(0), vec![
            DebatePhase::Init,
            DebatePhase::BullOpening,
            DebatePhase::Resolved
        ]);
    }

    #[test]
    fn resolved_is_terminal() {
        let resolved = DebateState {
            phase: DebatePhase::Resolved,
            round: 2,
        };
        assert_eq!(resolved.next(5), resolved);
    }

    #[test]
    fn refinement_clamps_and_preserves_direction() {
        let (pair, _) = theses();
        let refined = RefinedThesis {
            fair_probability: 1.4,
            confidence: -0.2,
            core_argument: "Overwhelming".to_string(),
            catalysts: vec![],
            failure_conditions: vec![],
        };
        let updated = apply_refinement(&pair.bull, refined, 0.5);
        assert_eq!(updated.direction, Direction::Yes);
        assert_eq!(updated.fair_probability, 1.0);
        assert_eq!(updated.confidence, 0.0);
        assert!((updated.edge - 0.5).abs() < 1e-12);
        assert_eq!(updated.catalysts, pair.bull.catalysts);
    }

    #[tokio::test]
    async fn successful_debate_refines_without_touching_originals() {
        let (pair, mbd) = theses();
        let critic = Arc::new(ScriptedCritic::converging(0.5));
        let engine = DebateEngine::new(critic.clone(), config(1, 1_000));
        let record = engine
            .run(&pair, &mbd, Uuid::new_v4(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!record.degraded);
        assert_eq!(record.final_phase, DebatePhase::Resolved);
        assert_eq!(record.original_bull, pair.bull);
        assert_eq!(record.original_bear, pair.bear);
        assert_ne!(record.refined_bull.fair_probability, pair.bull.fair_probability);
        assert_eq!(
            critic.phases(),
            vec![
                DebatePhase::BullOpening,
                DebatePhase::BearRebuttal,
                DebatePhase::BullRebuttal
            ]
        );
        assert_eq!(record.exchanges.len(), 3);
        assert_eq!(record.refined_bull.direction, Direction::Yes);
        assert_eq!(record.refined_bear.direction, Direction::No);
    }

    #[tokio::test]
    async fn critic_failure_degrades_to_originals() {
        let (pair, mbd) = theses();
        let critic = Arc::new(ScriptedCritic::failing_at(DebatePhase::BearRebuttal));
        let engine = DebateEngine::new(critic, config(1, 1_000));
        let record = engine
            .run(&pair, &mbd, Uuid::new_v4(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(record.degraded);
        assert_eq!(record.final_phase, DebatePhase::BearRebuttal);
        assert_eq!(record.refined_bull, pair.bull);
        assert_eq!(record.refined_bear, pair.bear);
        assert!(record.degradation_reason.as_deref().unwrap().contains("BearRebuttal"));
        assert_eq!(record.exchanges.len(), 1);
        assert!(record.implied_probability().is_none());
    }

    #[tokio::test]
    async fn round_timeout_degrades() {
        let (pair, mbd) = theses();
        let engine = DebateEngine::new(Arc::new(ScriptedCritic::hanging()), config(1, 20));
        let record = engine
            .run(&pair, &mbd, Uuid::new_v4(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(record.degraded);
        assert_eq!(record.final_phase, DebatePhase::BullOpening);
        assert!(record.degradation_reason.as_deref().unwrap().contains("Timed out"));
    }

    #[tokio::test]
    async fn caller_cancellation_is_fatal() {
        let (pair, mbd) = theses();
        let engine = DebateEngine::new(Arc::new(ScriptedCritic::hanging()), config(1, 60_000));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let err = engine.run(&pair, &mbd, Uuid::new_v4(), &cancel).await.unwrap_err();
        assert_eq!(
            err,
            DebateError::Cancelled {
                phase: DebatePhase::BullOpening
            }
        );
    }
}
