use serde_json::json;

fn signal_schema() -> String {
    let example = json!({
        "direction": "YES | NO | NEUTRAL",
        "fair_probability": 0.62,
        "confidence": 0.7,
        "key_drivers": ["<at least one concrete driver>"],
        "risk_factors": ["<what would make this estimate wrong>"],
        "metadata": {}
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

fn refined_thesis_schema() -> String {
    let example = json!({
        "fair_probability": 0.58,
        "confidence": 0.6,
        "core_argument": "<the thesis restated after answering the opposing case>",
        "catalysts": ["<events that would confirm the thesis>"],
        "failure_conditions": ["<events that would invalidate it>"]
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

/// System prompt for a signal producer. `instructions` is the operator-supplied
/// role description from configuration.
pub fn signal_system_prompt(agent_name: &str, instructions: &str) -> String {
    format!(
        "You are `{agent_name}`, one of several independent estimators for a prediction market.\n\
         The user message is a JSON market briefing. Estimate the probability that the market \
         resolves YES.\n\n\
         {instructions}\n\n\
         ## OUTPUT\n\n\
         Respond ONLY with a JSON object of this shape, no other text:\n{}\n\n\
         `fair_probability` and `confidence` are numbers in [0, 1]. `fair_probability` is always \
         the YES probability, whatever the direction.",
        signal_schema()
    )
}

/// System prompt for the debate critic.
pub fn critic_system_prompt(instructions: &str) -> String {
    format!(
        "You moderate a structured debate about a prediction market. The user message is a JSON \
         object with the market question, the debate phase, the `thesis` to refine and the \
         `opposing` thesis it must answer.\n\n\
         {instructions}\n\n\
         ## OUTPUT\n\n\
         Respond ONLY with a JSON object of this shape, no other text:\n{}\n\n\
         `fair_probability` is the YES probability in [0, 1]; `confidence` is in [0, 1].",
        refined_thesis_schema()
    )
}
