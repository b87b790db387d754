use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which outcome a signal (or a thesis) leans toward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Yes,
    No,
    Neutral,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Yes => write!(f, "YES"),
            Direction::No => write!(f, "NO"),
            Direction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// One producer's probability estimate for a market.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSignal {
    pub agent_name: String,
    pub timestamp: DateTime<Utc>,
    /// 0.0 to 1.0, how much the producer trusts its own estimate.
    pub confidence: f64,
    pub direction: Direction,
    /// 0.0 to 1.0 estimate of the YES resolution probability.
    pub fair_probability: f64,
    pub key_drivers: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    /// Agent-specific payload. Carried through untouched; never read by the math.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AgentSignal {
    /// Reject signals the fusion math cannot use.
    pub fn validate(&self) -> Result<(), String> {
        if self.agent_name.trim().is_empty() {
            return Err("agent_name is empty".to_string());
        }
        if !is_unit_interval(self.fair_probability) {
            return Err(format!(
                "fair_probability {} outside [0, 1]",
                self.fair_probability
            ));
        }
        if !is_unit_interval(self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        if self.key_drivers.iter().all(|d| d.trim().is_empty()) {
            return Err("key_drivers must contain at least one entry".to_string());
        }
        Ok(())
    }
}

pub fn is_unit_interval(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentErrorKind {
    Timeout,
    ExecutionFailed,
}

/// Record of a producer that did not deliver a usable signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentError {
    pub agent_name: String,
    pub kind: AgentErrorKind,
    pub message: String,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signal() -> AgentSignal {
        AgentSignal {
            agent_name: "polling_intelligence".to_string(),
            timestamp: Utc::now(),
            confidence: 0.72,
            direction: Direction::Yes,
            fair_probability: 0.58,
            key_drivers: vec!["Three consecutive polls above 50%".to_string()],
            risk_factors: vec!["Small sample sizes".to_string()],
            metadata: serde_json::json!({"polls": [0.51, 0.53, 0.52]}),
        }
    }

    #[test]
    fn roundtrip_signal() {
        let signal = sample_signal();
        let json = serde_json::to_string(&signal).unwrap();
        let parsed: AgentSignal = serde_json::from_str(&json).unwrap();
        assert_eq!(signal, parsed);
    }

    #[test]
    fn direction_serialization() {
        assert_eq!(serde_json::to_string(&Direction::Yes).unwrap(), "\"YES\"");
        assert_eq!(
            serde_json::to_string(&Direction::Neutral).unwrap(),
            "\"NEUTRAL\""
        );
        assert_eq!(Direction::No.to_string(), "NO");
    }

    #[test]
    fn error_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&AgentErrorKind::ExecutionFailed).unwrap(),
            "\"EXECUTION_FAILED\""
        );
        assert_eq!(
            serde_json::to_string(&AgentErrorKind::Timeout).unwrap(),
            "\"TIMEOUT\""
        );
    }

    #[test]
    fn signal_without_optional_fields() {
        let json = serde_json::json!({
            "agent_name": "market_microstructure",
            "timestamp": "2026-05-01T12:00:00Z",
            "confidence": 0.5,
            "direction": "NEUTRAL",
            "fair_probability": 0.5,
            "key_drivers": ["Flat order book"]
        });
        let signal: AgentSignal = serde_json::from_value(json).unwrap();
        assert!(signal.risk_factors.is_empty());
        assert!(signal.metadata.is_null());
        assert!(signal.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let mut signal = sample_signal();
        signal.fair_probability = 1.2;
        assert!(signal.validate().unwrap_err().contains("fair_probability"));

        let mut signal = sample_signal();
        signal.confidence = f64::NAN;
        assert!(signal.validate().unwrap_err().contains("confidence"));
    }

    #[test]
    fn validate_rejects_empty_drivers() {
        let mut signal = sample_signal();
        signal.key_drivers = vec![" ".to_string()];
        assert!(signal.validate().is_err());

        signal.key_drivers.clear();
        assert!(signal.validate().is_err());
    }
}
