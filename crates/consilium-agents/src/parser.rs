use chrono::Utc;
use consilium_models::{AgentSignal, Direction, RefinedThesis};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ProducerError;

/// Extract the first JSON object from model output that may carry surrounding text.
///
/// Tried in order: the whole text, a fenced code block, the first balanced
/// `{ ... }` outside string literals.
pub fn extract_json(text: &str) -> Result<String, ProducerError> {
    let trimmed = text.trim();
    let candidates = [
        trimmed.starts_with('{').then(|| trimmed.to_string()),
        fenced_block(trimmed),
        first_balanced_object(trimmed),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|candidate| serde_json::from_str::<serde_json::Value>(candidate).is_ok_and(|v| v.is_object()))
        .ok_or_else(|| {
            ProducerError::Parse(format!(
                "No valid JSON object found in response (length={})",
                text.len()
            ))
        })
}

/// Contents of the first ``` fence, with or without a `json` tag.
fn fenced_block(text: &str) -> Option<String> {
    let open = text.find("```")?;
    let after_ticks = &text[open + 3..];
    let body_start = after_ticks.find('\n')? + 1;
    let header = after_ticks[..body_start].trim();
    if !header.is_empty() && !header.eq_ignore_ascii_case("json") {
        return None;
    }
    let body = &after_ticks[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim().to_string())
}

fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| text[s..=i].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

fn parse_object<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, ProducerError> {
    let json_str = extract_json(raw)?;
    serde_json::from_str(&json_str).map_err(|e| {
        ProducerError::Parse(format!(
            "Failed to parse {what}: {e} (length={})",
            json_str.len()
        ))
    })
}

/// What a producer model returns. The name and timestamp are filled in locally.
#[derive(Debug, Clone, Deserialize)]
pub struct SignalDraft {
    pub direction: Direction,
    pub fair_probability: f64,
    pub confidence: f64,
    pub key_drivers: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SignalDraft {
    pub fn into_signal(self, agent_name: &str) -> AgentSignal {
        AgentSignal {
            agent_name: agent_name.to_string(),
            timestamp: Utc::now(),
            confidence: self.confidence,
            direction: self.direction,
            fair_probability: self.fair_probability,
            key_drivers: self.key_drivers,
            risk_factors: self.risk_factors,
            metadata: self.metadata,
        }
    }
}

/// Parse a producer response into a signal stamped with `agent_name`.
pub fn parse_signal(raw: &str, agent_name: &str) -> Result<AgentSignal, ProducerError> {
    let draft: SignalDraft = parse_object(raw, "signal")?;
    Ok(draft.into_signal(agent_name))
}

pub fn parse_refined_thesis(raw: &str) -> Result<RefinedThesis, ProducerError> {
    parse_object(raw, "refined thesis")
}
