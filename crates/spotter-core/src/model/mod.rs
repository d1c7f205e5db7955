//! Generation model abstraction.
//!
//! Model internals (API clients, local inference, subprocesses) live behind
//! [`GenerationModel`]. The orchestrator only ever sees a prompt going in
//! and text coming out; everything about how the text is produced is the
//! adapter's business.

use async_trait::async_trait;
use thiserror::Error;

pub mod command;
pub mod retry;

pub use command::CommandModel;
pub use retry::{RetryPolicy, complete_with_retry};

/// One completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Sampling seed, for backends that honor one.
    pub seed: Option<u64>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: 0.2,
            max_tokens: 4096,
            seed: None,
        }
    }
}

/// Raw model output.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Name of the model that produced it.
    pub model: String,
}

/// Errors surfaced by generation backends.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The backend did not answer within its budget.
    #[error("model timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The backend cannot be reached or refused the request.
    #[error("model unavailable: {detail}")]
    Unavailable { detail: String },

    /// The backend answered with bytes we cannot use at the transport level.
    #[error("malformed model output: {detail}")]
    Malformed { detail: String },
}

impl ModelError {
    /// Transient errors are worth retrying; malformed output is not, the
    /// backend would just produce it again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable { .. })
    }
}

/// A text generation backend.
#[async_trait]
pub trait GenerationModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ModelError>;
}

// The orchestrator holds models as trait objects.
const _: () = {
    fn _assert_object_safe(_: &dyn GenerationModel) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
