use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Top-level configuration for Consilium.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsiliumConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl ConsiliumConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = self.pipeline.problems();
        problems.extend(self.agents.problems());
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

/// Numeric knobs for every pipeline stage. Shared read-only across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub debate: DebateConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub recommendation: RecommendationConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let o = &self.orchestrator;
        if o.min_agents_required == 0 {
            problems.push("orchestrator.min_agents_required must be at least 1".to_string());
        }
        if o.per_agent_timeout_ms == 0 {
            problems.push("orchestrator.per_agent_timeout_ms must be positive".to_string());
        }

        let f = &self.fusion;
        for (agent, weight) in &f.weights {
            if !weight.is_finite() || *weight < 0.0 {
                problems.push(format!(
                    "fusion.weights.{agent} = {weight} must be finite and non-negative"
                ));
            }
        }
        check_unit(&mut problems, "fusion.conflict_threshold", f.conflict_threshold);
        check_unit(&mut problems, "fusion.alignment_bonus", f.alignment_bonus);

        let d = &self.debate;
        if d.rounds > 0 && d.round_timeout_ms == 0 {
            problems.push("debate.round_timeout_ms must be positive".to_string());
        }

        let c = &self.consensus;
        check_unit(
            &mut problems,
            "consensus.high_confidence_threshold",
            c.high_confidence_threshold,
        );
        check_unit(
            &mut problems,
            "consensus.high_disagreement_threshold",
            c.high_disagreement_threshold,
        );
        if c.high_confidence_threshold > c.high_disagreement_threshold {
            problems.push(format!(
                "consensus.high_confidence_threshold ({}) exceeds high_disagreement_threshold ({})",
                c.high_confidence_threshold, c.high_disagreement_threshold
            ));
        }
        if !c.band_multiplier.is_finite() || c.band_multiplier < 0.0 {
            problems.push(format!(
                "consensus.band_multiplier {} must be finite and non-negative",
                c.band_multiplier
            ));
        }
        check_unit(
            &mut problems,
            "consensus.debate_blend_weight",
            c.debate_blend_weight,
        );

        let r = &self.recommendation;
        check_unit(
            &mut problems,
            "recommendation.min_edge_threshold",
            r.min_edge_threshold,
        );
        let l = &r.liquidity;
        for (name, score) in [
            ("high_risk_below_score", l.high_risk_below_score),
            ("low_risk_min_score", l.low_risk_min_score),
        ] {
            if !score.is_finite() || score < 0.0 {
                problems.push(format!(
                    "recommendation.liquidity.{name} {score} must be finite and non-negative"
                ));
            }
        }
        if l.high_risk_below_score > l.low_risk_min_score {
            problems.push(
                "recommendation.liquidity.high_risk_below_score exceeds low_risk_min_score"
                    .to_string(),
            );
        }
        check_unit(
            &mut problems,
            "recommendation.liquidity.high_risk_above_spread",
            l.high_risk_above_spread,
        );
        check_unit(
            &mut problems,
            "recommendation.liquidity.low_risk_max_spread",
            l.low_risk_max_spread,
        );
        if l.low_risk_max_spread > l.high_risk_above_spread {
            problems.push(
                "recommendation.liquidity.low_risk_max_spread exceeds high_risk_above_spread"
                    .to_string(),
            );
        }

        problems
    }
}

fn check_unit(problems: &mut Vec<String>, field: &str, value: f64) {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        problems.push(format!("{field} {value} outside [0, 1]"));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    #[serde(default = "default_min_agents")]
    pub min_agents_required: usize,
    /// Upper bound on a single producer call, in milliseconds.
    #[serde(default = "default_agent_timeout_ms")]
    pub per_agent_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_agents_required: default_min_agents(),
            per_agent_timeout_ms: default_agent_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusionConfig {
    /// Per-agent weights. Agents not listed weigh 1.0; 0.0 excludes an agent.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    /// Pairs whose fair probabilities differ by more than this are conflicts.
    #[serde(default = "default_conflict_threshold")]
    pub conflict_threshold: f64,
    /// Added to fused confidence when more than 70% of signals agree on direction.
    #[serde(default = "default_alignment_bonus")]
    pub alignment_bonus: f64,
}

impl FusionConfig {
    pub fn weight_for(&self, agent_name: &str) -> f64 {
        self.weights.get(agent_name).copied().unwrap_or(1.0)
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            conflict_threshold: default_conflict_threshold(),
            alignment_bonus: default_alignment_bonus(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateConfig {
    /// Rebuttal rounds after the bull opening. 0 disables the debate.
    #[serde(default = "default_debate_rounds")]
    pub rounds: u32,
    /// Upper bound on one critique call, in milliseconds.
    #[serde(default = "default_round_timeout_ms")]
    pub round_timeout_ms: u64,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            rounds: default_debate_rounds(),
            round_timeout_ms: default_round_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusConfig {
    /// Disagreement index below this is high-confidence.
    #[serde(default = "default_high_confidence_threshold")]
    pub high_confidence_threshold: f64,
    /// Disagreement index at or above this is high-uncertainty.
    #[serde(default = "default_high_disagreement_threshold")]
    pub high_disagreement_threshold: f64,
    /// Band half-width = band_multiplier * disagreement index.
    #[serde(default = "default_band_multiplier")]
    pub band_multiplier: f64,
    /// Weight given to the debate-implied probability when the debate succeeded.
    #[serde(default = "default_debate_blend_weight")]
    pub debate_blend_weight: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: default_high_confidence_threshold(),
            high_disagreement_threshold: default_high_disagreement_threshold(),
            band_multiplier: default_band_multiplier(),
            debate_blend_weight: default_debate_blend_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationConfig {
    #[serde(default = "default_min_edge_threshold")]
    pub min_edge_threshold: f64,
    #[serde(default)]
    pub liquidity: LiquidityCutoffs,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            min_edge_threshold: default_min_edge_threshold(),
            liquidity: LiquidityCutoffs::default(),
        }
    }
}

/// Cutoffs over `liquidity_score` (0-10) and `bid_ask_spread` (probability units).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiquidityCutoffs {
    #[serde(default = "default_high_risk_below_score")]
    pub high_risk_below_score: f64,
    #[serde(default = "default_low_risk_min_score")]
    pub low_risk_min_score: f64,
    #[serde(default = "default_high_risk_above_spread")]
    pub high_risk_above_spread: f64,
    #[serde(default = "default_low_risk_max_spread")]
    pub low_risk_max_spread: f64,
}

impl Default for LiquidityCutoffs {
    fn default() -> Self {
        Self {
            high_risk_below_score: default_high_risk_below_score(),
            low_risk_min_score: default_low_risk_min_score(),
            high_risk_above_spread: default_high_risk_above_spread(),
            low_risk_max_spread: default_low_risk_max_spread(),
        }
    }
}

/// Which signal producers and critic the binary wires up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentsConfig {
    /// Default model for producers and the critic.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_producers")]
    pub producers: Vec<ProducerConfig>,
    #[serde(default)]
    pub critic: Option<CriticConfig>,
}

impl AgentsConfig {
    pub fn enabled_producers(&self) -> impl Iterator<Item = &ProducerConfig> {
        self.producers.iter().filter(|p| p.enabled)
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();
        for producer in &self.producers {
            if producer.name.trim().is_empty() {
                problems.push("agents.producers entry has an empty name".to_string());
            } else if !seen.insert(producer.name.as_str()) {
                problems.push(format!(
                    "agents.producers name '{}' is duplicated",
                    producer.name
                ));
            }
        }
        problems
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            producers: default_producers(),
            critic: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProducerConfig {
    pub name: String,
    /// Operator-supplied role description passed to the model.
    #[serde(default)]
    pub instructions: String,
    /// Override model for this producer. Falls back to `AgentsConfig::default_model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriticConfig {
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuditConfig {
    /// SQLite file receiving audit entries. None keeps them in memory only.
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

fn default_min_agents() -> usize {
    2
}
fn default_agent_timeout_ms() -> u64 {
    45_000
}
fn default_conflict_threshold() -> f64 {
    0.20
}
fn default_alignment_bonus() -> f64 {
    0.10
}
fn default_debate_rounds() -> u32 {
    1
}
fn default_round_timeout_ms() -> u64 {
    30_000
}
fn default_high_confidence_threshold() -> f64 {
    0.05
}
fn default_high_disagreement_threshold() -> f64 {
    0.15
}
fn default_band_multiplier() -> f64 {
    1.0
}
fn default_debate_blend_weight() -> f64 {
    0.5
}
fn default_min_edge_threshold() -> f64 {
    0.05
}
fn default_high_risk_below_score() -> f64 {
    5.0
}
fn default_low_risk_min_score() -> f64 {
    7.0
}
fn default_high_risk_above_spread() -> f64 {
    0.05
}
fn default_low_risk_max_spread() -> f64 {
    0.02
}
fn default_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}
fn default_true() -> bool {
    true
}
fn default_producers() -> Vec<ProducerConfig> {
    [
        (
            "market_microstructure",
            "Estimate from order book depth, spread and recent price action.",
        ),
        (
            "probability_baseline",
            "Estimate from base rates of comparable resolved questions.",
        ),
        (
            "risk_assessment",
            "Estimate with emphasis on tail scenarios and resolution ambiguity.",
        ),
    ]
    .into_iter()
    .map(|(name, instructions)| ProducerConfig {
        name: name.to_string(),
        instructions: instructions.to_string(),
        model: None,
        enabled: true,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_config() {
        let config = ConsiliumConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ConsiliumConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn default_config_is_valid() {
        let config = ConsiliumConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agents.enabled_producers().count(), 3);
        assert_eq!(config.pipeline.orchestrator.min_agents_required, 2);
        assert_eq!(config.pipeline.consensus.debate_blend_weight, 0.5);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: ConsiliumConfig = toml::from_str("").unwrap();
        assert_eq!(config, ConsiliumConfig::default());
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[pipeline.orchestrator]
min_agents_required = 3
per_agent_timeout_ms = 20000

[pipeline.fusion]
conflict_threshold = 0.25
alignment_bonus = 0.05

[pipeline.fusion.weights]
polling_intelligence = 1.5
market_microstructure = 0.5

[pipeline.debate]
rounds = 2

[pipeline.consensus]
band_multiplier = 1.5

[pipeline.recommendation]
min_edge_threshold = 0.03

[pipeline.recommendation.liquidity]
high_risk_below_score = 4.0

[agents]
default_model = "claude-sonnet-4-5-20250929"

[[agents.producers]]
name = "polling_intelligence"
instructions = "Weigh recent polls."

[[agents.producers]]
name = "market_microstructure"
enabled = false

[agents.critic]
instructions = "Attack the weakest assumption."

[audit]
sqlite_path = "/tmp/consilium_audit.db"
"#;

        let config: ConsiliumConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.pipeline.orchestrator.min_agents_required, 3);
        assert_eq!(config.pipeline.fusion.weight_for("polling_intelligence"), 1.5);
        assert_eq!(config.pipeline.fusion.weight_for("unlisted"), 1.0);
        assert_eq!(config.pipeline.debate.rounds, 2);
        assert_eq!(config.pipeline.debate.round_timeout_ms, 30_000);
        assert_eq!(config.pipeline.recommendation.liquidity.low_risk_min_score, 7.0);
        assert_eq!(config.agents.enabled_producers().count(), 1);
        assert!(config.agents.critic.as_ref().unwrap().enabled);
        assert_eq!(
            config.audit.sqlite_path.as_deref(),
            Some("/tmp/consilium_audit.db")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_weight_is_invalid() {
        let mut config = ConsiliumConfig::default();
        config
            .pipeline
            .fusion
            .weights
            .insert("bad_agent".to_string(), -1.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fusion.weights.bad_agent"));
    }

    #[test]
    fn out_of_range_thresholds_are_reported_together() {
        let mut config = PipelineConfig::default();
        config.fusion.conflict_threshold = 1.5;
        config.consensus.debate_blend_weight = -0.1;
        config.recommendation.min_edge_threshold = f64::NAN;

        let ConfigError::Invalid(problems) = config.validate().unwrap_err();
        assert_eq!(problems.len(), 3, "{problems:?}");
    }

    #[test]
    fn inverted_regime_thresholds_are_invalid() {
        let mut config = PipelineConfig::default();
        config.consensus.high_confidence_threshold = 0.2;
        config.consensus.high_disagreement_threshold = 0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_min_agents_and_timeout_are_invalid() {
        let mut config = PipelineConfig::default();
        config.orchestrator.min_agents_required = 0;
        config.orchestrator.per_agent_timeout_ms = 0;
        let ConfigError::Invalid(problems) = config.validate().unwrap_err();
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn inconsistent_liquidity_cutoffs_are_invalid() {
        let mut config = PipelineConfig::default();
        config.recommendation.liquidity.low_risk_max_spread = 0.10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_producer_names_are_invalid() {
        let mut config = ConsiliumConfig::default();
        let first = config.agents.producers[0].clone();
        config.agents.producers.push(first);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicated"));
    }
}
