use consilium_models::{
    ConsensusProbability, Explanation, LiquidityCutoffs, LiquidityRisk, MarketBriefingDocument,
    ProbabilityRange, RecommendationConfig, RecommendationMetadata, Thesis, TradeAction,
    TradeRecommendation,
};

pub fn liquidity_risk(liquidity_score: f64, spread: f64, cutoffs: &LiquidityCutoffs) -> LiquidityRisk {
    if liquidity_score < cutoffs.high_risk_below_score || spread > cutoffs.high_risk_above_spread {
        LiquidityRisk::High
    } else if liquidity_score >= cutoffs.low_risk_min_score && spread <= cutoffs.low_risk_max_spread {
        LiquidityRisk::Low
    } else {
        LiquidityRisk::Medium
    }
}

pub fn choose_action(edge: f64, min_edge_threshold: f64) -> TradeAction {
    if edge.abs() < min_edge_threshold {
        TradeAction::NoTrade
    } else if edge > 0.0 {
        TradeAction::LongYes
    } else {
        TradeAction::LongNo
    }
}

fn action_label(action: TradeAction) -> &'static str {
    match action {
        TradeAction::LongYes => "LONG_YES",
        TradeAction::LongNo => "LONG_NO",
        TradeAction::NoTrade => "NO_TRADE",
    }
}

fn risk_label(risk: LiquidityRisk) -> &'static str {
    match risk {
        LiquidityRisk::Low => "low",
        LiquidityRisk::Medium => "medium",
        LiquidityRisk::High => "high",
    }
}

/// Derive the recommendation. Pure: same inputs, same output.
///
/// `bull` and `bear` are the theses to explain with (refined when the debate
/// succeeded, original otherwise).
pub fn recommend(
    consensus: &ConsensusProbability,
    mbd: &MarketBriefingDocument,
    bull: &Thesis,
    bear: &Thesis,
    config: &RecommendationConfig,
) -> TradeRecommendation {
    let market = mbd.current_probability;
    let c = consensus.consensus_probability;
    let edge = c - market;
    let action = choose_action(edge, config.min_edge_threshold);

    let entry_zone = ProbabilityRange::around(market, mbd.bid_ask_spread / 2.0);
    let target_zone = ProbabilityRange::around(c, consensus.confidence_band.width() / 2.0);
    let win_probability = match action {
        TradeAction::LongYes => Some(c),
        TradeAction::LongNo => Some(1.0 - c),
        TradeAction::NoTrade => None,
    };
    let liquidity = liquidity_risk(mbd.liquidity_score, mbd.bid_ask_spread, &config.liquidity);
    let expected_value = edge * 100.0;

    let briefing_catalysts = mbd.metadata.key_catalysts.iter().map(|k| k.event.clone());
    let ambiguity = mbd
        .metadata
        .ambiguity_flags
        .iter()
        .map(|flag| format!("Resolution ambiguity: {flag}"));

    let (core_thesis, key_catalysts, failure_scenarios) = match action {
        TradeAction::LongYes | TradeAction::LongNo => {
            let aligned = if action == TradeAction::LongYes { bull } else { bear };
            let mut catalysts: Vec<String> = briefing_catalysts.collect();
            for catalyst in &aligned.catalysts {
                if !catalysts.contains(catalyst) {
                    catalysts.push(catalyst.clone());
                }
            }
            let mut failures = aligned.failure_conditions.clone();
            failures.extend(ambiguity);
            (aligned.core_argument.clone(), catalysts, failures)
        }
        TradeAction::NoTrade => (
            format!(
                "Consensus {c:.3} is within {:.3} of the market {market:.3}; no edge to trade",
                config.min_edge_threshold
            ),
            briefing_catalysts.collect(),
            ambiguity.collect(),
        ),
    };

    let summary = format!(
        "{} at {market:.2}: consensus {c:.2} vs market {market:.2} ({expected_value:+.1} pts, {}, {} liquidity risk)",
        action_label(action),
        consensus.regime,
        risk_label(liquidity),
    );

    TradeRecommendation {
        market_id: mbd.market_id.clone(),
        action,
        entry_zone,
        target_zone,
        expected_value,
        win_probability,
        liquidity_risk: liquidity,
        explanation: Explanation {
            summary,
            core_thesis,
            key_catalysts,
            failure_scenarios,
        },
        metadata: RecommendationMetadata {
            consensus_probability: c,
            market_probability: market,
            edge,
            confidence_band: consensus.confidence_band,
            regime: consensus.regime,
        },
    }
}
