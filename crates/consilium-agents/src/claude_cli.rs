use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProducerError;

/// Configuration for a Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(45),
        }
    }
}

/// Invoke the `claude` CLI with a system prompt and user prompt.
/// Returns the raw stdout text.
///
/// The child process is killed if the call times out, is cancelled, or the
/// returned future is dropped.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
    cancel: &CancellationToken,
) -> Result<String, ProducerError> {
    debug!(model = %config.model, timeout_ms = config.timeout.as_millis(), "Invoking claude CLI");

    let child = Command::new("claude")
        .args([
            "-p",
            user_prompt,
            "--system-prompt",
            system_prompt,
            "--model",
            &config.model,
            "--output-format",
            "text",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProducerError::Cli(format!("Failed to spawn claude: {e}")))?;

    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(ProducerError::Cancelled),
        result = tokio::time::timeout(config.timeout, child.wait_with_output()) => result
            .map_err(|_| ProducerError::Timeout(config.timeout.as_millis() as u64))?
            .map_err(|e| ProducerError::Cli(format!("Failed to read claude output: {e}")))?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
        return Err(ProducerError::Cli(format!(
            "claude exited {}: {}",
            output.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(ProducerError::Cli(
            "Claude returned empty response".to_string(),
        ));
    }

    Ok(stdout)
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude")
        .arg("--version")
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClaudeCliConfig::default();
        assert_eq!(config.model, "claude-3-5-haiku-latest");
        assert_eq!(config.timeout, Duration::from_secs(45));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let config = ClaudeCliConfig {
            model: "unused".to_string(),
            timeout: Duration::from_secs(5),
        };
        // Either the spawn fails (no CLI installed) or the cancellation wins;
        // in both cases no output is returned.
        let result = invoke_claude("system", "user", &config, &cancel).await;
        assert!(matches!(
            result,
            Err(ProducerError::Cancelled) | Err(ProducerError::Cli(_))
        ));
    }
}
