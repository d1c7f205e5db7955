//! Transport-level retry around model completion.
//!
//! This loop only covers transient transport failures (timeouts, refused
//! connections). Content problems in an otherwise delivered completion are
//! the orchestrator's repair loop, which has its own separate budget.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Completion, CompletionRequest, GenerationModel, ModelError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based): exponential, capped,
    /// with up to 25% added jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter_ms = exp.as_millis() as u64 / 4;
        if jitter_ms == 0 {
            return exp;
        }
        exp + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

/// Run `request` against `model`, retrying transient failures per `policy`.
///
/// Cancellation cuts the backoff sleep short and surfaces as the last
/// transport error observed.
pub async fn complete_with_retry(
    model: &dyn GenerationModel,
    request: &CompletionRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Completion, ModelError> {
    let mut attempt = 0;
    loop {
        match model.complete(request).await {
            Ok(completion) => return Ok(completion),
            Err(err) if err.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                warn!(
                    model = model.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient model failure, retrying"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(err),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
