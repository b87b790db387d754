//! Test support: market fixtures plus scripted producers and critics.
//!
//! Scripted producers never touch the network. Each one follows a fixed
//! behavior (answer, fail, hang, panic, ...) so orchestrator and pipeline
//! tests can exercise every outcome deterministically.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use consilium_models::{
    AgentSignal, BriefingMetadata, DebatePhase, Direction, EventType, KeyCatalyst,
    MarketBriefingDocument, RefinedThesis, VolatilityRegime,
};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::error::ProducerError;
use crate::producer::{CritiqueProducer, CritiqueRequest, ProducerContext, SignalProducer};

/// A valid briefing with a 0.02 spread, liquidity 8.0, one catalyst and one
/// ambiguity flag.
pub fn sample_briefing(market_id: &str, current_probability: f64) -> MarketBriefingDocument {
    MarketBriefingDocument {
        market_id: market_id.to_string(),
        condition_id: format!("0x{market_id}"),
        event_type: EventType::Economic,
        question: "Will the Fed cut rates at the June meeting?".to_string(),
        resolution_criteria: "Resolves YES if the FOMC lowers the target range in June."
            .to_string(),
        expiry_timestamp: Utc::now() + ChronoDuration::days(45),
        current_probability,
        liquidity_score: 8.0,
        bid_ask_spread: 0.02,
        volatility_regime: VolatilityRegime::Medium,
        volume_24h: Decimal::new(25_000_000, 2),
        metadata: BriefingMetadata {
            ambiguity_flags: vec!["Inter-meeting cuts not addressed".to_string()],
            key_catalysts: vec![KeyCatalyst {
                event: "FOMC statement".to_string(),
                timestamp: Utc::now() + ChronoDuration::days(30),
            }],
        },
    }
}

pub fn signal(name: &str, direction: Direction, fair_probability: f64, confidence: f64) -> AgentSignal {
    AgentSignal {
        agent_name: name.to_string(),
        timestamp: Utc::now(),
        confidence,
        direction,
        fair_probability,
        key_drivers: vec![format!("{name} driver")],
        risk_factors: vec![],
        metadata: serde_json::Value::Null,
    }
}

fn direction_for(p: f64) -> Direction {
    if p > 0.5 {
        Direction::Yes
    } else if p < 0.5 {
        Direction::No
    } else {
        Direction::Neutral
    }
}

/// Observes what happened to a cancellation-probe call after the fact.
#[derive(Debug, Clone, Default)]
pub struct CancellationProbe {
    token: Arc<Mutex<Option<CancellationToken>>>,
    dropped: Arc<AtomicBool>,
}

impl CancellationProbe {
    /// True once the token handed to the call has been cancelled.
    pub fn token_cancelled(&self) -> bool {
        self.token
            .lock()
            .map(|t| t.as_ref().is_some_and(CancellationToken::is_cancelled))
            .unwrap_or(false)
    }

    /// True once the in-flight call future has been dropped.
    pub fn call_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

enum Behavior {
    Answer {
        direction: Direction,
        fair_probability: f64,
        confidence: f64,
        delay: Option<Duration>,
    },
    Fail,
    Hang,
    Panic,
    Probe(CancellationProbe),
}

pub struct ScriptedProducer {
    name: String,
    claimed_name: Option<String>,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl ScriptedProducer {
    fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            claimed_name: None,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    /// Direction follows the probability relative to 0.5.
    pub fn fixed(name: &str, fair_probability: f64, confidence: f64) -> Self {
        Self::with_direction(name, direction_for(fair_probability), fair_probability, confidence)
    }

    pub fn with_direction(
        name: &str,
        direction: Direction,
        fair_probability: f64,
        confidence: f64,
    ) -> Self {
        Self::new(
            name,
            Behavior::Answer {
                direction,
                fair_probability,
                confidence,
                delay: None,
            },
        )
    }

    /// Answers after `delay`, unless cancelled first.
    pub fn slow(name: &str, delay: Duration, fair_probability: f64, confidence: f64) -> Self {
        Self::new(
            name,
            Behavior::Answer {
                direction: direction_for(fair_probability),
                fair_probability,
                confidence,
                delay: Some(delay),
            },
        )
    }

    pub fn failing(name: &str) -> Self {
        Self::new(name, Behavior::Fail)
    }

    /// Never settles and ignores its cancellation token.
    pub fn hanging(name: &str) -> Self {
        Self::new(name, Behavior::Hang)
    }

    pub fn panicking(name: &str) -> Self {
        Self::new(name, Behavior::Panic)
    }

    /// Answers with a fair probability of 1.5.
    pub fn invalid(name: &str) -> Self {
        Self::new(
            name,
            Behavior::Answer {
                direction: Direction::Yes,
                fair_probability: 1.5,
                confidence: 0.5,
                delay: None,
            },
        )
    }

    /// Hangs until dropped, recording its token and its own drop.
    pub fn cancellation_probe(name: &str) -> (Self, CancellationProbe) {
        let probe = CancellationProbe::default();
        (Self::new(name, Behavior::Probe(probe.clone())), probe)
    }

    /// Put a different name on the returned signal than the producer's own.
    pub fn claiming_name(mut self, name: &str) -> Self {
        self.claimed_name = Some(name.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self, direction: Direction, fair_probability: f64, confidence: f64) -> AgentSignal {
        let name = self.claimed_name.as_deref().unwrap_or(&self.name);
        signal(name, direction, fair_probability, confidence)
    }
}

#[async_trait]
impl SignalProducer for ScriptedProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(
        &self,
        _mbd: &MarketBriefingDocument,
        ctx: &ProducerContext,
    ) -> Result<AgentSignal, ProducerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Answer {
                direction,
                fair_probability,
                confidence,
                delay,
            } => {
                if let Some(delay) = delay {
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => return Err(ProducerError::Cancelled),
                        _ = tokio::time::sleep(*delay) => {}
                    }
                }
                Ok(self.answer(*direction, *fair_probability, *confidence))
            }
            Behavior::Fail => Err(ProducerError::Cli(format!("{} exited with status 1", self.name))),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("{} panicked", self.name),
            Behavior::Probe(probe) => {
                if let Ok(mut token) = probe.token.lock() {
                    *token = Some(ctx.cancel.clone());
                }
                let _flag = DropFlag(Arc::clone(&probe.dropped));
                std::future::pending().await
            }
        }
    }
}

enum CriticBehavior {
    Converging(f64),
    FailingAt(DebatePhase),
    NonFinite,
    Hanging,
}

/// Scripted debate critic. Records every phase it is asked about.
pub struct ScriptedCritic {
    behavior: CriticBehavior,
    phases: Mutex<Vec<DebatePhase>>,
}

impl ScriptedCritic {
    fn new(behavior: CriticBehavior) -> Self {
        Self {
            behavior,
            phases: Mutex::new(Vec::new()),
        }
    }

    /// Moves each thesis `fraction` of the way toward the opposing thesis.
    pub fn converging(fraction: f64) -> Self {
        Self::new(CriticBehavior::Converging(fraction))
    }

    /// Converges by half until `phase`, where it fails.
    pub fn failing_at(phase: DebatePhase) -> Self {
        Self::new(CriticBehavior::FailingAt(phase))
    }

    pub fn non_finite() -> Self {
        Self::new(CriticBehavior::NonFinite)
    }

    pub fn hanging() -> Self {
        Self::new(CriticBehavior::Hanging)
    }

    pub fn phases(&self) -> Vec<DebatePhase> {
        self.phases.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn converge(request: &CritiqueRequest, fraction: f64) -> RefinedThesis {
        let from = request.thesis.fair_probability;
        let toward = request.opposing.fair_probability;
        RefinedThesis {
            fair_probability: from + fraction * (toward - from),
            confidence: request.thesis.confidence,
            core_argument: format!("{:?}: {}", request.phase, request.thesis.core_argument),
            catalysts: vec![],
            failure_conditions: vec![],
        }
    }
}

#[async_trait]
impl CritiqueProducer for ScriptedCritic {
    fn name(&self) -> &str {
        "scripted_critic"
    }

    async fn critique(
        &self,
        request: &CritiqueRequest,
        _ctx: &ProducerContext,
    ) -> Result<RefinedThesis, ProducerError> {
        if let Ok(mut phases) = self.phases.lock() {
            phases.push(request.phase);
        }
        match &self.behavior {
            CriticBehavior::Converging(fraction) => Ok(Self::converge(request, *fraction)),
            CriticBehavior::FailingAt(phase) if *phase == request.phase => Err(ProducerError::Parse(
                "critic returned no JSON object".to_string(),
            )),
            CriticBehavior::FailingAt(_) => Ok(Self::converge(request, 0.5)),
            CriticBehavior::NonFinite => Ok(RefinedThesis {
                fair_probability: f64::NAN,
                confidence: 0.5,
                core_argument: String::new(),
                catalysts: vec![],
                failure_conditions: vec![],
            }),
            CriticBehavior::Hanging => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_briefing_is_valid() {
        let mbd = sample_briefing("fed-june", 0.42);
        assert!(mbd.validate().is_ok());
        assert_eq!(mbd.metadata.key_catalysts.len(), 1);
        assert!(!mbd.metadata.ambiguity_flags.is_empty());
    }

    #[test]
    fn fixed_direction_follows_probability() {
        assert_eq!(direction_for(0.6), Direction::Yes);
        assert_eq!(direction_for(0.4), Direction::No);
        assert_eq!(direction_for(0.5), Direction::Neutral);
    }
}
