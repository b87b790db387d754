use std::fmt;

use serde::{Deserialize, Serialize};

use crate::agent_signal::Direction;

/// A closed probability interval with `lo <= hi`, both inside [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProbabilityRange {
    pub lo: f64,
    pub hi: f64,
}

impl ProbabilityRange {
    /// Build `[center - half_width, center + half_width]` clipped to [0, 1].
    pub fn around(center: f64, half_width: f64) -> Self {
        Self::clipped(center - half_width, center + half_width)
    }

    /// Clip both ends to [0, 1] and order them.
    pub fn clipped(a: f64, b: f64) -> Self {
        let a = clamp_unit(a);
        let b = clamp_unit(b);
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }
}

/// Clamp to [0, 1]; NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Two signals whose fair probabilities differ by more than the conflict threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalConflict {
    pub agent1: String,
    pub agent2: String,
    pub disagreement: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedSignal {
    pub fair_probability: f64,
    pub confidence: f64,
    pub direction: Direction,
    pub contributing_agents: Vec<String>,
    pub conflicts: Vec<SignalConflict>,
    /// Fraction of contributing signals that share `direction`.
    pub alignment: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Regime {
    HighConfidence,
    ModerateConfidence,
    HighUncertainty,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::HighConfidence => write!(f, "high-confidence"),
            Regime::ModerateConfidence => write!(f, "moderate-confidence"),
            Regime::HighUncertainty => write!(f, "high-uncertainty"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusProbability {
    pub consensus_probability: f64,
    pub confidence_band: ProbabilityRange,
    pub disagreement_index: f64,
    pub regime: Regime,
    pub contributing_signals: Vec<String>,
    pub fused_probability: f64,
    /// Present only when a non-degraded debate was blended in.
    pub debate_implied_probability: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn around_clips_to_unit_interval() {
        let range = ProbabilityRange::around(0.95, 0.1);
        assert!((range.lo - 0.85).abs() < 1e-12);
        assert_eq!(range.hi, 1.0);

        let range = ProbabilityRange::around(0.02, 0.1);
        assert_eq!(range.lo, 0.0);
        assert!((range.hi - 0.12).abs() < 1e-12);
    }

    #[test]
    fn clipped_orders_ends() {
        let range = ProbabilityRange::clipped(0.7, 0.2);
        assert_eq!(range.lo, 0.2);
        assert_eq!(range.hi, 0.7);
        assert!((range.width() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn negative_half_width_still_ordered() {
        let range = ProbabilityRange::around(0.5, -0.1);
        assert!(range.lo <= range.hi);
    }

    #[test]
    fn clamp_unit_handles_nan() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(-0.3), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
    }

    #[test]
    fn regime_serialization_matches_display() {
        for regime in [
            Regime::HighConfidence,
            Regime::ModerateConfidence,
            Regime::HighUncertainty,
        ] {
            let json = serde_json::to_string(&regime).unwrap();
            assert_eq!(json, format!("\"{regime}\""));
        }
    }
}
