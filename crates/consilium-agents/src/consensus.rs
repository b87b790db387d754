use consilium_models::{
    clamp_unit, AgentSignal, ConsensusConfig, ConsensusProbability, DebateRecord, FusedSignal,
    ProbabilityRange, Regime,
};

use crate::error::ConsensusError;

/// Population standard deviation of the signals' fair probabilities.
/// Zero for one signal or none.
pub fn disagreement_index(probabilities: &[f64]) -> f64 {
    if probabilities.len() <= 1 {
        return 0.0;
    }
    let n = probabilities.len() as f64;
    let mean = probabilities.iter().sum::<f64>() / n;
    let variance = probabilities.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
    clamp_unit(variance.sqrt())
}

pub fn classify_regime(disagreement: f64, config: &ConsensusConfig) -> Regime {
    if disagreement < config.high_confidence_threshold {
        Regime::HighConfidence
    } else if disagreement < config.high_disagreement_threshold {
        Regime::ModerateConfidence
    } else {
        Regime::HighUncertainty
    }
}

/// Blend fusion output with a successful debate into a banded consensus.
///
/// `fused` is None when fusion failed; the consensus is then unavailable.
pub fn build_consensus(
    fused: Option<&FusedSignal>,
    debate: Option<&DebateRecord>,
    signals: &[AgentSignal],
    config: &ConsensusConfig,
) -> Result<ConsensusProbability, ConsensusError> {
    let fused = fused.ok_or_else(|| {
        ConsensusError::MissingFusedSignal("signal fusion produced no estimate".to_string())
    })?;

    let debate_implied = debate.and_then(DebateRecord::implied_probability);
    let consensus = match debate_implied {
        Some(implied) => clamp_unit(
            (1.0 - config.debate_blend_weight) * fused.fair_probability
                + config.debate_blend_weight * implied,
        ),
        None => fused.fair_probability,
    };

    let probabilities: Vec<f64> = signals.iter().map(|s| s.fair_probability).collect();
    let disagreement = disagreement_index(&probabilities);

    Ok(ConsensusProbability {
        consensus_probability: consensus,
        confidence_band: ProbabilityRange::around(consensus, config.band_multiplier * disagreement),
        disagreement_index: disagreement,
        regime: classify_regime(disagreement, config),
        contributing_signals: fused.contributing_agents.clone(),
        fused_probability: fused.fair_probability,
        debate_implied_probability: debate_implied,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::signal;
    use consilium_models::{DebatePhase, Direction, Thesis, ThesisBasis};

    fn fused(p: f64, agents: &[&str]) -> FusedSignal {
        FusedSignal {
            fair_probability: p,
            confidence: 0.7,
            direction: Direction::Yes,
            contributing_agents: agents.iter().map(|a| a.to_string()).collect(),
            conflicts: vec![],
            alignment: 1.0,
        }
    }

    fn thesis(direction: Direction, p: f64) -> Thesis {
        Thesis {
            direction,
            fair_probability: p,
            confidence: 0.6,
            edge: p - 0.5,
            supporting_signals: vec![],
            basis: ThesisBasis::ConfidenceWeighted,
            core_argument: String::new(),
            catalysts: vec![],
            failure_conditions: vec![],
        }
    }

    fn debate(bull: f64, bear: f64, degraded: bool) -> DebateRecord {
        DebateRecord {
            original_bull: thesis(Direction::Yes, 0.7),
            original_bear: thesis(Direction::No, 0.3),
            refined_bull: thesis(Direction::Yes, bull),
            refined_bear: thesis(Direction::No, bear),
            degraded,
            degradation_reason: None,
            final_phase: DebatePhase::Resolved,
            exchanges: vec![],
        }
    }

    fn signals(ps: &[f64]) -> Vec<AgentSignal> {
        ps.iter()
            .enumerate()
            .map(|(i, p)| signal(&format!("agent_{i}"), Direction::Neutral, *p, 0.5))
            .collect()
    }

    #[test]
    fn disagreement_of_scenario_a() {
        let d = disagreement_index(&[0.60, 0.62, 0.58]);
        assert!((d - 0.016_329_9).abs() < 1e-6);
    }

    #[test]
    fn unanimous_signals_have_zero_disagreement() {
        let config = ConsensusConfig::default();
        let c = build_consensus(Some(&fused(0.55, &["a", "b"])), None, &signals(&[0.55, 0.55, 0.55]), &config)
            .unwrap();
        assert!(c.disagreement_index.abs() < 1e-12);
        assert_eq!(c.regime, Regime::HighConfidence);
        assert!(c.confidence_band.width() < 1e-12);
    }

    #[test]
    fn more_spread_never_lowers_disagreement() {
        let mut previous = 0.0;
        for spread in [0.0, 0.05, 0.1, 0.2, 0.3, 0.4, 0.5] {
            let d = disagreement_index(&[0.5 - spread, 0.5, 0.5 + spread]);
            assert!(d + 1e-12 >= previous, "spread {spread}: {d} < {previous}");
            previous = d;
        }
        assert_eq!(disagreement_index(&[0.3]), 0.0);
        assert_eq!(disagreement_index(&[]), 0.0);
    }

    #[test]
    fn split_signals_are_high_uncertainty_with_wide_band() {
        let config = ConsensusConfig::default();
        let c = build_consensus(Some(&fused(0.5, &["a", "b"])), None, &signals(&[0.9, 0.1]), &config)
            .unwrap();
        assert!((c.disagreement_index - 0.4).abs() < 1e-12);
        assert_eq!(c.regime, Regime::HighUncertainty);
        assert!((c.confidence_band.lo - 0.1).abs() < 1e-12);
        assert!((c.confidence_band.hi - 0.9).abs() < 1e-12);
    }

    #[test]
    fn regime_boundaries() {
        let config = ConsensusConfig::default();
        assert_eq!(classify_regime(0.049, &config), Regime::HighConfidence);
        assert_eq!(classify_regime(0.05, &config), Regime::ModerateConfidence);
        assert_eq!(classify_regime(0.149, &config), Regime::ModerateConfidence);
        assert_eq!(classify_regime(0.15, &config), Regime::HighUncertainty);
    }

    #[test]
    fn successful_debate_is_blended() {
        let config = ConsensusConfig {
            debate_blend_weight: 0.25,
            ..ConsensusConfig::default()
        };
        let record = debate(0.66, 0.46, false);
        let c = build_consensus(Some(&fused(0.6, &["a"])), Some(&record), &signals(&[0.6]), &config)
            .unwrap();
        // 0.75 * 0.6 + 0.25 * 0.56
        assert!((c.consensus_probability - 0.59).abs() < 1e-12);
        assert!((c.debate_implied_probability.unwrap() - 0.56).abs() < 1e-12);
        assert_eq!(c.fused_probability, 0.6);
    }

    #[test]
    fn degraded_debate_is_ignored() {
        let config = ConsensusConfig::default();
        let record = debate(0.9, 0.8, true);
        let c = build_consensus(Some(&fused(0.6, &["a"])), Some(&record), &signals(&[0.6]), &config)
            .unwrap();
        assert_eq!(c.consensus_probability, 0.6);
        assert_eq!(c.debate_implied_probability, None);
    }

    #[test]
    fn band_width_scales_with_multiplier() {
        let width = |k: f64| {
            let config = ConsensusConfig {
                band_multiplier: k,
                ..ConsensusConfig::default()
            };
            build_consensus(Some(&fused(0.5, &["a", "b", "c"])), None, &signals(&[0.4, 0.5, 0.6]), &config)
                .unwrap()
                .confidence_band
                .width()
        };
        let narrow = width(1.0);
        assert!(narrow > 0.0);
        assert!((width(2.0) - 2.0 * narrow).abs() < 1e-12);
        assert!(width(3.0) > width(2.0));
        assert!(width(0.0).abs() < 1e-12);
    }

    #[test]
    fn band_is_clipped_and_ordered() {
        let config = ConsensusConfig {
            band_multiplier: 3.0,
            ..ConsensusConfig::default()
        };
        let c = build_consensus(Some(&fused(0.95, &["a", "b"])), None, &signals(&[0.99, 0.7]), &config)
            .unwrap();
        assert!(c.confidence_band.lo <= c.confidence_band.hi);
        assert_eq!(c.confidence_band.hi, 1.0);
        assert!(c.confidence_band.lo >= 0.0);
    }

    #[test]
    fn missing_fused_signal_is_unavailable() {
        let err = build_consensus(None, None, &signals(&[0.5]), &ConsensusConfig::default()).unwrap_err();
        assert!(matches!(err, ConsensusError::MissingFusedSignal(_)));
    }

    #[test]
    fn contributing_signals_come_from_fusion() {
        let c = build_consensus(
            Some(&fused(0.6, &["a", "c"])),
            None,
            &signals(&[0.6, 0.6, 0.6]),
            &ConsensusConfig::default(),
        )
        .unwrap();
        assert_eq!(c.contributing_signals, vec!["a", "c"]);
    }
}
