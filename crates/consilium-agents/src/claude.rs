use async_trait::async_trait;
use consilium_models::{AgentSignal, MarketBriefingDocument, RefinedThesis};

use crate::claude_cli::{invoke_claude, ClaudeCliConfig};
use crate::error::ProducerError;
use crate::parser::{parse_refined_thesis, parse_signal};
use crate::producer::{CritiqueProducer, CritiqueRequest, ProducerContext, SignalProducer};
use crate::prompts::{critic_system_prompt, signal_system_prompt};

/// A signal producer backed by the Claude CLI.
pub struct ClaudeSignalProducer {
    pub name: String,
    pub instructions: String,
    pub model: String,
}

impl ClaudeSignalProducer {
    pub fn new(name: String, instructions: String, model: String) -> Self {
        Self {
            name,
            instructions,
            model,
        }
    }
}

#[async_trait]
impl SignalProducer for ClaudeSignalProducer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn produce(
        &self,
        mbd: &MarketBriefingDocument,
        ctx: &ProducerContext,
    ) -> Result<AgentSignal, ProducerError> {
        let system_prompt = signal_system_prompt(&self.name, &self.instructions);
        let user_prompt = serde_json::to_string(mbd)?;
        let cli_config = ClaudeCliConfig {
            model: self.model.clone(),
            timeout: ctx.timeout,
        };
        let raw_output = invoke_claude(&system_prompt, &user_prompt, &cli_config, &ctx.cancel).await?;
        parse_signal(&raw_output, &self.name)
    }
}

/// The debate critic, backed by the Claude CLI.
pub struct ClaudeCritic {
    pub instructions: String,
    pub model: String,
}

impl ClaudeCritic {
    pub fn new(instructions: String, model: String) -> Self {
        Self {
            instructions,
            model,
        }
    }
}

#[async_trait]
impl CritiqueProducer for ClaudeCritic {
    fn name(&self) -> &str {
        "claude_critic"
    }

    async fn critique(
        &self,
        request: &CritiqueRequest,
        ctx: &ProducerContext,
    ) -> Result<RefinedThesis, ProducerError> {
        let system_prompt = critic_system_prompt(&self.instructions);
        let user_prompt = serde_json::to_string(request)?;
        let cli_config = ClaudeCliConfig {
            model: self.model.clone(),
            timeout: ctx.timeout,
        };
        let raw_output = invoke_claude(&system_prompt, &user_prompt, &cli_config, &ctx.cancel).await?;
        parse_refined_thesis(&raw_output)
    }
}
