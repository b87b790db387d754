use consilium_models::{
    clamp_unit, AgentSignal, Direction, MarketBriefingDocument, Thesis, ThesisBasis, ThesisPair,
};
use tracing::{debug, warn};

pub const NO_OPPOSING_SIGNALS: &str = "no_opposing_signals";

/// Strategies tried in order for each side; the first that yields an estimate wins.
pub const THESIS_STRATEGIES: [ThesisBasis; 3] = [
    ThesisBasis::ConfidenceWeighted,
    ThesisBasis::EqualWeighted,
    ThesisBasis::MarketImplied,
];

/// Which side a signal argues for, if any.
pub fn side_of(signal: &AgentSignal, market_probability: f64) -> Option<Direction> {
    match signal.direction {
        Direction::Yes => Some(Direction::Yes),
        Direction::No => Some(Direction::No),
        Direction::Neutral if signal.fair_probability > market_probability => Some(Direction::Yes),
        Direction::Neutral if signal.fair_probability < market_probability => Some(Direction::No),
        Direction::Neutral => None,
    }
}

/// `(fair_probability, confidence)` for a supporting subset, or None when the
/// strategy does not apply.
fn estimate(basis: ThesisBasis, support: &[&AgentSignal], market: f64) -> Option<(f64, f64)> {
    match basis {
        ThesisBasis::ConfidenceWeighted => {
            let total: f64 = support.iter().map(|s| s.confidence).sum();
            if support.is_empty() || total <= 0.0 {
                return None;
            }
            let p = support.iter().map(|s| s.fair_probability * s.confidence).sum::<f64>() / total;
            let c = support.iter().map(|s| s.confidence * s.confidence).sum::<f64>() / total;
            Some((p, c))
        }
        ThesisBasis::EqualWeighted => {
            if support.is_empty() {
                return None;
            }
            let n = support.len() as f64;
            let p = support.iter().map(|s| s.fair_probability).sum::<f64>() / n;
            let c = support.iter().map(|s| s.confidence).sum::<f64>() / n;
            Some((p, c))
        }
        ThesisBasis::MarketImplied => Some((market, 0.0)),
    }
}

fn dedup_preserving_order(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim().to_string();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn build_side(
    direction: Direction,
    support: &[&AgentSignal],
    mbd: &MarketBriefingDocument,
) -> Thesis {
    let market = mbd.current_probability;
    let (basis, (p, c)) = THESIS_STRATEGIES
        .iter()
        .find_map(|basis| estimate(*basis, support, market).map(|e| (*basis, e)))
        .unwrap_or((ThesisBasis::MarketImplied, (market, 0.0)));
    let p = clamp_unit(p);
    let c = clamp_unit(c);

    let side = if direction == Direction::Yes { "bull" } else { "bear" };
    let core_argument = if basis == ThesisBasis::MarketImplied {
        format!("No {side} signals; holding the market-implied {market:.2}")
    } else {
        dedup_preserving_order(support.iter().flat_map(|s| s.key_drivers.iter().cloned()))
            .join("; ")
    };

    debug!(side, basis = ?basis, fair_probability = p, confidence = c, supporting = support.len(), "Thesis built");

    Thesis {
        direction,
        fair_probability: p,
        confidence: c,
        edge: p - market,
        supporting_signals: support.iter().map(|s| s.agent_name.clone()).collect(),
        basis,
        core_argument,
        catalysts: mbd
            .metadata
            .key_catalysts
            .iter()
            .map(|k| k.event.clone())
            .collect(),
        failure_conditions: dedup_preserving_order(
            support.iter().flat_map(|s| s.risk_factors.iter().cloned()),
        ),
    }
}

/// Partition signals into a bull (YES) and bear (NO) thesis. Never fails.
pub fn build_theses(signals: &[AgentSignal], mbd: &MarketBriefingDocument) -> ThesisPair {
    let mut ordered: Vec<&AgentSignal> = signals.iter().collect();
    ordered.sort_by(|a, b| {
        a.agent_name
            .cmp(&b.agent_name)
            .then(a.fair_probability.total_cmp(&b.fair_probability))
    });

    let market = mbd.current_probability;
    let mut bull_support = Vec::new();
    let mut bear_support = Vec::new();
    for signal in ordered {
        match side_of(signal, market) {
            Some(Direction::Yes) => bull_support.push(signal),
            Some(Direction::No) => bear_support.push(signal),
            _ => {}
        }
    }

    let mut warnings = Vec::new();
    if bull_support.is_empty() || bear_support.is_empty() {
        warn!(
            market_id = %mbd.market_id,
            bull = bull_support.len(),
            bear = bear_support.len(),
            "Thesis side without supporting signals"
        );
        warnings.push(NO_OPPOSING_SIGNALS.to_string());
    }

    ThesisPair {
        bull: build_side(Direction::Yes, &bull_support, mbd),
        bear: build_side(Direction::No, &bear_support, mbd),
        warnings,
    }
}
