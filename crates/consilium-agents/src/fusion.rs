use consilium_models::{clamp_unit, AgentSignal, Direction, FusedSignal, FusionConfig, SignalConflict};

use crate::error::FusionError;

/// Fraction of contributing signals that must share the fused direction
/// before the alignment bonus applies.
pub const ALIGNMENT_BONUS_THRESHOLD: f64 = 0.7;

/// Every unordered pair whose fair probabilities differ by more than `threshold`.
/// Input must already be in canonical order.
fn detect_conflicts(signals: &[&AgentSignal], threshold: f64) -> Vec<SignalConflict> {
    let mut conflicts = Vec::new();
    for (i, a) in signals.iter().enumerate() {
        for b in &signals[i + 1..] {
            let disagreement = (a.fair_probability - b.fair_probability).abs();
            if disagreement > threshold {
                conflicts.push(SignalConflict {
                    agent1: a.agent_name.clone(),
                    agent2: b.agent_name.clone(),
                    disagreement,
                });
            }
        }
    }
    conflicts
}

/// Direction with the largest total weight x confidence. Ties go YES, NO, NEUTRAL.
fn dominant_direction(weighted: &[(&AgentSignal, f64)]) -> Direction {
    let mass = |direction: Direction| -> f64 {
        weighted
            .iter()
            .filter(|(s, _)| s.direction == direction)
            .map(|(_, wc)| wc)
            .sum()
    };
    let mut best = Direction::Yes;
    let mut best_mass = mass(Direction::Yes);
    for direction in [Direction::No, Direction::Neutral] {
        let m = mass(direction);
        if m > best_mass {
            best = direction;
            best_mass = m;
        }
    }
    best
}

/// Weighted fusion of all successful signals.
///
/// Deterministic: signals are put in canonical order (agent name, then
/// probability) before any summation, so the result does not depend on
/// completion order.
pub fn fuse(signals: &[AgentSignal], config: &FusionConfig) -> Result<FusedSignal, FusionError> {
    if signals.is_empty() {
        return Err(FusionError::NoSignals);
    }

    let mut ordered: Vec<&AgentSignal> = signals.iter().collect();
    ordered.sort_by(|a, b| {
        a.agent_name
            .cmp(&b.agent_name)
            .then(a.fair_probability.total_cmp(&b.fair_probability))
            .then(a.confidence.total_cmp(&b.confidence))
    });

    let weighted: Vec<(&AgentSignal, f64)> = ordered
        .iter()
        .map(|s| (*s, config.weight_for(&s.agent_name) * s.confidence))
        .filter(|(_, wc)| *wc > 0.0)
        .collect();
    let total_wc: f64 = weighted.iter().map(|(_, wc)| wc).sum();
    if weighted.is_empty() || total_wc <= 0.0 {
        return Err(FusionError::NoEffectiveWeight);
    }

    let fair_probability = clamp_unit(
        weighted
            .iter()
            .map(|(s, wc)| s.fair_probability * wc)
            .sum::<f64>()
            / total_wc,
    );
    let mean_confidence = weighted
        .iter()
        .map(|(s, wc)| s.confidence * wc)
        .sum::<f64>()
        / total_wc;

    let conflicts = detect_conflicts(&ordered, config.conflict_threshold);
    let n = ordered.len();
    let total_pairs = n * n.saturating_sub(1) / 2;
    let conflict_density = if total_pairs == 0 {
        0.0
    } else {
        conflicts.len() as f64 / total_pairs as f64
    };

    let direction = dominant_direction(&weighted);
    let aligned = weighted
        .iter()
        .filter(|(s, _)| s.direction == direction)
        .count();
    let alignment = aligned as f64 / weighted.len() as f64;

    let mut confidence = mean_confidence * (1.0 - conflict_density);
    if alignment > ALIGNMENT_BONUS_THRESHOLD {
        confidence += config.alignment_bonus;
    }

    Ok(FusedSignal {
        fair_probability,
        confidence: clamp_unit(confidence),
        direction,
        contributing_agents: weighted.iter().map(|(s, _)| s.agent_name.clone()).collect(),
        conflicts,
        alignment,
    })
}
