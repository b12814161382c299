use async_trait::async_trait;

use crate::errors::ClawResult;
use crate::voice::types::VoiceTask;

/// Speech front end: turns a started voice task into command text.
#[async_trait]
pub trait CommandSource: Send + Sync {
    /// `Ok(None)` when nothing intelligible was heard.
    async fn listen_for_command(&self, task: &VoiceTask) -> ClawResult<Option<String>>;
}
