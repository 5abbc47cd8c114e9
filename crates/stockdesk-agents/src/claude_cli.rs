use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::InvokeError;
use crate::invoker::GenerationService;

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
            timeout: Duration::from_secs(120),
        }
    }
}

/// Build the `claude` command. The user prompt goes to stdin, since a
/// single argv element is capped at 128 KiB on Linux.
fn claude_command(system_prompt: &str, config: &ClaudeCliConfig) -> Command {
    let mut cmd = Command::new("claude");
    cmd.args([
        "-p",
        "--system-prompt",
        system_prompt,
        "--model",
        &config.model,
        "--output-format",
        "text",
    ])
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
    cmd
}

/// Invoke the `claude` CLI with a system prompt and user prompt.
/// Returns the raw stdout text.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, InvokeError> {
    debug!(model = %config.model, prompt_len = user_prompt.len(), "Invoking claude CLI");

    let output = tokio::time::timeout(config.timeout, async {
        let mut child = claude_command(system_prompt, config)
            .spawn()
            .map_err(|e| InvokeError::Transport(format!("failed to spawn claude: {e}")))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| InvokeError::Transport("claude stdin unavailable".to_string()))?;

        let write = async move {
            stdin.write_all(user_prompt.as_bytes()).await?;
            stdin.shutdown().await
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        written.map_err(|e| InvokeError::Transport(format!("failed to send prompt: {e}")))?;
        output.map_err(|e| InvokeError::Transport(format!("claude did not finish: {e}")))
    })
    .await
    .map_err(|_| {
        InvokeError::Transport(format!("timed out after {} seconds", config.timeout.as_secs()))
    })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr, "Claude CLI failed");
        return Err(InvokeError::Transport(format!(
            "claude exited {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(InvokeError::EmptyResponse);
    }

    Ok(stdout)
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Generation service backed by the local `claude` CLI.
#[derive(Debug, Clone, Default)]
pub struct ClaudeCliGenerator {
    pub config: ClaudeCliConfig,
}

impl ClaudeCliGenerator {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            config: ClaudeCliConfig {
                model: model.into(),
                timeout,
            },
        }
    }
}

#[async_trait]
impl GenerationService for ClaudeCliGenerator {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, instructions: &str, context: &str) -> Result<String, InvokeError> {
        invoke_claude(instructions, context, &self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClaudeCliConfig::default();
        assert_eq!(config.model, "claude-3-5-haiku-latest");
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn prompt_is_not_passed_as_argument() {
        let config = ClaudeCliConfig::default();
        let cmd = claude_command("You are an analyst.", &config);
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-p",
                "--system-prompt",
                "You are an analyst.",
                "--model",
                "claude-3-5-haiku-latest",
                "--output-format",
                "text",
            ]
        );
    }

    #[test]
    fn generator_is_named_after_model() {
        let generator = ClaudeCliGenerator::new("claude-sonnet-4-5-20250929", Duration::from_secs(5));
        assert_eq!(generator.name(), "claude-sonnet-4-5-20250929");
    }
}
