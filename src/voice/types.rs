use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceTaskStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl VoiceTaskStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, VoiceTaskStatus::Completed | VoiceTaskStatus::Cancelled)
    }
}

/// One voice invocation waiting for, or holding, the automation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceTask {
    pub id: u64,
    pub wake_word_detected: bool,
    /// Already-recognized command text; `None` means listen for it when the task starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: VoiceTaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl VoiceTask {
    pub(crate) fn finish(&mut self, status: VoiceTaskStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

/// Result of an enqueue: the new task, what it displaced, and the task
/// that should start now (if the session was free).
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub task: VoiceTask,
    pub cancelled: Vec<u64>,
    pub started: Option<VoiceTask>,
}
