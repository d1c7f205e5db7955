//! Subprocess generation backend.
//!
//! Runs a configured command once per completion: the prompt goes in on
//! stdin, the completion comes back on stdout. Sampling parameters are
//! passed in the environment so any wrapper script can pick them up. This
//! is the deployment shape for local llama.cpp-style runners and for stub
//! models in tests.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Completion, CompletionRequest, GenerationModel, ModelError};

/// Environment variables the child receives.
const ENV_TEMPERATURE: &str = "SPOTTER_TEMPERATURE";
const ENV_MAX_TOKENS: &str = "SPOTTER_MAX_TOKENS";
const ENV_SEED: &str = "SPOTTER_SEED";

pub struct CommandModel {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl std::fmt::Debug for CommandModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandModel")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CommandModel {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl GenerationModel for CommandModel {
    fn name(&self) -> &str {
        &self.program
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ModelError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(ENV_TEMPERATURE, request.temperature.to_string())
            .env(ENV_MAX_TOKENS, request.max_tokens.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(seed) = request.seed {
            cmd.env(ENV_SEED, seed.to_string());
        }

        let mut child = cmd.spawn().map_err(|e| ModelError::Unavailable {
            detail: format!("failed to spawn {:?}: {e}", self.program),
        })?;

        // Write the prompt and close stdin so the child sees EOF.
        let mut stdin = child.stdin.take().ok_or_else(|| ModelError::Unavailable {
            detail: "child stdin not captured".to_owned(),
        })?;
        stdin
            .write_all(request.prompt.as_bytes())
            .await
            .map_err(|e| ModelError::Unavailable {
                detail: format!("failed to write prompt: {e}"),
            })?;
        drop(stdin);

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ModelError::Unavailable {
                    detail: format!("failed to collect output: {e}"),
                });
            }
            Err(_) => {
                warn!(program = %self.program, "model run overran its budget, killing");
                return Err(ModelError::Timeout {
                    elapsed_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        if !output.status.success() {
            return Err(ModelError::Unavailable {
                detail: format!("model exited with {}", output.status),
            });
        }

        let text = String::from_utf8(output.stdout).map_err(|e| ModelError::Malformed {
            detail: format!("stdout is not utf-8: {e}"),
        })?;
        debug!(program = %self.program, bytes = text.len(), "model run complete");
        Ok(Completion {
            text,
            model: self.program.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
