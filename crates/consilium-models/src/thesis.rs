use serde::{Deserialize, Serialize};

use crate::agent_signal::Direction;

/// How a thesis' numbers were derived.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThesisBasis {
    /// Confidence-weighted mean of the supporting signals.
    ConfidenceWeighted,
    /// Plain mean; used when every supporting signal has zero confidence.
    EqualWeighted,
    /// No supporting signals: the market's own quote.
    MarketImplied,
}

/// One side of the argument (bull = YES, bear = NO).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thesis {
    pub direction: Direction,
    pub fair_probability: f64,
    pub confidence: f64,
    /// fair_probability minus the market's current probability.
    pub edge: f64,
    /// Agent names of the signals backing this side.
    pub supporting_signals: Vec<String>,
    pub basis: ThesisBasis,
    pub core_argument: String,
    pub catalysts: Vec<String>,
    pub failure_conditions: Vec<String>,
}

impl Thesis {
    pub fn is_market_implied(&self) -> bool {
        self.basis == ThesisBasis::MarketImplied
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThesisPair {
    pub bull: Thesis,
    pub bear: Thesis,
    /// Non-fatal construction warnings (e.g. `no_opposing_signals`).
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// What a critique collaborator hands back for one debate phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefinedThesis {
    pub fair_probability: f64,
    pub confidence: f64,
    pub core_argument: String,
    #[serde(default)]
    pub catalysts: Vec<String>,
    #[serde(default)]
    pub failure_conditions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebatePhase {
    Init,
    BullOpening,
    BearRebuttal,
    BullRebuttal,
    Resolved,
}

impl DebatePhase {
    /// The side that speaks in this phase, if any.
    pub fn speaker(&self) -> Option<Direction> {
        match self {
            DebatePhase::BullOpening | DebatePhase::BullRebuttal => Some(Direction::Yes),
            DebatePhase::BearRebuttal => Some(Direction::No),
            DebatePhase::Init | DebatePhase::Resolved => None,
        }
    }
}

/// A single completed phase of the debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateExchange {
    pub round: u32,
    pub phase: DebatePhase,
    pub probability_before: f64,
    pub probability_after: f64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateRecord {
    pub original_bull: Thesis,
    pub original_bear: Thesis,
    pub refined_bull: Thesis,
    pub refined_bear: Thesis,
    pub degraded: bool,
    /// Why the debate degraded, when it did.
    pub degradation_reason: Option<String>,
    pub final_phase: DebatePhase,
    #[serde(default)]
    pub exchanges: Vec<DebateExchange>,
}

impl DebateRecord {
    /// Mean of the refined bull and bear fair probabilities, or None when the
    /// debate degraded and its refinements were discarded.
    pub fn implied_probability(&self) -> Option<f64> {
        if self.degraded {
            return None;
        }
        Some((self.refined_bull.fair_probability + self.refined_bear.fair_probability) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thesis(direction: Direction, p: f64) -> Thesis {
        Thesis {
            direction,
            fair_probability: p,
            confidence: 0.7,
            edge: p - 0.5,
            supporting_signals: vec!["a".to_string()],
            basis: ThesisBasis::ConfidenceWeighted,
            core_argument: "argument".to_string(),
            catalysts: vec![],
            failure_conditions: vec![],
        }
    }

    fn record(degraded: bool) -> DebateRecord {
        DebateRecord {
            original_bull: thesis(Direction::Yes, 0.7),
            original_bear: thesis(Direction::No, 0.3),
            refined_bull: thesis(Direction::Yes, 0.64),
            refined_bear: thesis(Direction::No, 0.4),
            degraded,
            degradation_reason: degraded.then(|| "critic unavailable".to_string()),
            final_phase: DebatePhase::Resolved,
            exchanges: vec![],
        }
    }

    #[test]
    fn implied_probability_averages_refined_theses() {
        let implied = record(false).implied_probability().unwrap();
        assert!((implied - 0.52).abs() < 1e-12);
    }

    #[test]
    fn degraded_record_has_no_implied_probability() {
        assert!(record(true).implied_probability().is_none());
    }

    #[test]
    fn phase_speakers() {
        assert_eq!(DebatePhase::BullOpening.speaker(), Some(Direction::Yes));
        assert_eq!(DebatePhase::BearRebuttal.speaker(), Some(Direction::No));
        assert_eq!(DebatePhase::Resolved.speaker(), None);
    }

    #[test]
    fn phase_serialization() {
        assert_eq!(
            serde_json::to_string(&DebatePhase::BearRebuttal).unwrap(),
            "\"BEAR_REBUTTAL\""
        );
    }

    #[test]
    fn roundtrip_record() {
        let record = record(true);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: DebateRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }
}
