use serde::{Deserialize, Serialize};

use crate::consensus::{ProbabilityRange, Regime};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    LongYes,
    LongNo,
    NoTrade,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Explanation {
    pub summary: String,
    pub core_thesis: String,
    pub key_catalysts: Vec<String>,
    pub failure_scenarios: Vec<String>,
}

/// The numbers the action was derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationMetadata {
    pub consensus_probability: f64,
    pub market_probability: f64,
    pub edge: f64,
    pub confidence_band: ProbabilityRange,
    pub regime: Regime,
}

/// The actionable output of a run. Zones are in YES-probability space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecommendation {
    pub market_id: String,
    pub action: TradeAction,
    pub entry_zone: ProbabilityRange,
    pub target_zone: ProbabilityRange,
    /// Edge in percentage points (signed, YES terms).
    pub expected_value: f64,
    /// Probability the recommended side wins. None for NO_TRADE.
    pub win_probability: Option<f64>,
    pub liquidity_risk: LiquidityRisk,
    pub explanation: Explanation,
    pub metadata: RecommendationMetadata,
}

impl TradeRecommendation {
    pub fn is_actionable(&self) -> bool {
        self.action != TradeAction::NoTrade
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recommendation() -> TradeRecommendation {
        TradeRecommendation {
            market_id: "fed-cut-june".to_string(),
            action: TradeAction::LongYes,
            entry_zone: ProbabilityRange { lo: 0.49, hi: 0.51 },
            target_zone: ProbabilityRange { lo: 0.58, hi: 0.62 },
            expected_value: 10.0,
            win_probability: Some(0.6),
            liquidity_risk: LiquidityRisk::Low,
            explanation: Explanation {
                summary: "LONG_YES at 0.50".to_string(),
                core_thesis: "Inflation cooling faster than priced".to_string(),
                key_catalysts: vec!["CPI release".to_string()],
                failure_scenarios: vec!["Hot jobs report".to_string()],
            },
            metadata: RecommendationMetadata {
                consensus_probability: 0.6,
                market_probability: 0.5,
                edge: 0.1,
                confidence_band: ProbabilityRange { lo: 0.58, hi: 0.62 },
                regime: Regime::HighConfidence,
            },
        }
    }

    #[test]
    fn roundtrip_recommendation() {
        let rec = sample_recommendation();
        let json = serde_json::to_string(&rec).unwrap();
        let parsed: TradeRecommendation = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, parsed);
    }

    #[test]
    fn action_serialization() {
        assert_eq!(
            serde_json::to_string(&TradeAction::LongYes).unwrap(),
            "\"LONG_YES\""
        );
        assert_eq!(
            serde_json::to_string(&TradeAction::NoTrade).unwrap(),
            "\"NO_TRADE\""
        );
        assert_eq!(
            serde_json::to_string(&LiquidityRisk::Medium).unwrap(),
            "\"medium\""
        );
    }

    #[test]
    fn no_trade_is_not_actionable() {
        let mut rec = sample_recommendation();
        assert!(rec.is_actionable());
        rec.action = TradeAction::NoTrade;
        rec.win_probability = None;
        assert!(!rec.is_actionable());
    }
}
