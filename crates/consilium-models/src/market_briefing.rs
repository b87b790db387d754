use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Election,
    Policy,
    Court,
    Geopolitical,
    Economic,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityRegime {
    Low,
    Medium,
    High,
}

/// A scheduled event that may move the market.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyCatalyst {
    pub event: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BriefingMetadata {
    /// Known weaknesses in the resolution criteria (e.g. "undefined 'official'").
    #[serde(default)]
    pub ambiguity_flags: Vec<String>,
    #[serde(default)]
    pub key_catalysts: Vec<KeyCatalyst>,
}

/// Market Briefing Document: the immutable market snapshot every stage reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketBriefingDocument {
    pub market_id: String,
    pub condition_id: String,
    pub event_type: EventType,
    pub question: String,
    pub resolution_criteria: String,
    pub expiry_timestamp: DateTime<Utc>,
    /// Quoted YES probability, 0.0 to 1.0.
    pub current_probability: f64,
    /// 0 (illiquid) to 10 (deep book).
    pub liquidity_score: f64,
    /// Best ask minus best bid, in probability units.
    pub bid_ask_spread: f64,
    pub volatility_regime: VolatilityRegime,
    pub volume_24h: Decimal,
    #[serde(default)]
    pub metadata: BriefingMetadata,
}

impl MarketBriefingDocument {
    /// Check the numeric and identity fields the pipeline relies on.
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.market_id.trim().is_empty() {
            problems.push("market_id is empty".to_string());
        }
        if self.question.trim().is_empty() {
            problems.push("question is empty".to_string());
        }
        if !self.current_probability.is_finite() || !(0.0..=1.0).contains(&self.current_probability)
        {
            problems.push(format!(
                "current_probability {} outside [0, 1]",
                self.current_probability
            ));
        }
        if !self.bid_ask_spread.is_finite() || !(0.0..=1.0).contains(&self.bid_ask_spread) {
            problems.push(format!(
                "bid_ask_spread {} outside [0, 1]",
                self.bid_ask_spread
            ));
        }
        if !self.liquidity_score.is_finite() || self.liquidity_score < 0.0 {
            problems.push(format!(
                "liquidity_score {} must be finite and non-negative",
                self.liquidity_score
            ));
        }
        if self.volume_24h.is_sign_negative() {
            problems.push(format!("volume_24h {} is negative", self.volume_24h));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn sample_briefing() -> MarketBriefingDocument {
        MarketBriefingDocument {
            market_id: "senate-2026-control".to_string(),
            condition_id: "0xabc123".to_string(),
            event_type: EventType::Election,
            question: "Will Party A control the Senate after the 2026 midterms?".to_string(),
            resolution_criteria: "Resolves YES if Party A holds 51+ seats on Jan 3, 2027."
                .to_string(),
            expiry_timestamp: Utc::now() + Duration::days(90),
            current_probability: 0.47,
            liquidity_score: 8.2,
            bid_ask_spread: 0.01,
            volatility_regime: VolatilityRegime::Medium,
            volume_24h: dec!(184233.50),
            metadata: BriefingMetadata {
                ambiguity_flags: vec!["Independents caucusing unclear".to_string()],
                key_catalysts: vec![KeyCatalyst {
                    event: "Final debate".to_string(),
                    timestamp: Utc::now() + Duration::days(30),
                }],
            },
        }
    }

    #[test]
    fn roundtrip_briefing() {
        let briefing = sample_briefing();
        let json = serde_json::to_string(&briefing).unwrap();
        let parsed: MarketBriefingDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(briefing, parsed);
        // serde-with-str keeps currency amounts exact
        assert!(json.contains("\"184233.50\""));
    }

    #[test]
    fn metadata_defaults_when_omitted() {
        let json = serde_json::json!({
            "market_id": "m1",
            "condition_id": "c1",
            "event_type": "economic",
            "question": "Will CPI exceed 3%?",
            "resolution_criteria": "BLS print",
            "expiry_timestamp": "2027-01-01T00:00:00Z",
            "current_probability": 0.4,
            "liquidity_score": 6.0,
            "bid_ask_spread": 0.02,
            "volatility_regime": "low",
            "volume_24h": "1000"
        });
        let briefing: MarketBriefingDocument = serde_json::from_value(json).unwrap();
        assert!(briefing.metadata.ambiguity_flags.is_empty());
        assert!(briefing.metadata.key_catalysts.is_empty());
        assert_eq!(briefing.event_type, EventType::Economic);
    }

    #[test]
    fn validate_accepts_sample() {
        assert!(sample_briefing().validate().is_ok());
    }

    #[test]
    fn validate_collects_all_problems() {
        let mut briefing = sample_briefing();
        briefing.market_id = "  ".to_string();
        briefing.current_probability = 1.3;
        briefing.bid_ask_spread = f64::NAN;
        briefing.volume_24h = dec!(-5);

        let problems = briefing.validate().unwrap_err();
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("current_probability")));
    }
}
