use async_trait::async_trait;

use crate::errors::ClawResult;

/// Text-generation backend used as the decision oracle.
/// Implementations only turn a prompt into a completion; parsing and
/// rate limiting live in `DecisionClient`.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> ClawResult<String>;
}
