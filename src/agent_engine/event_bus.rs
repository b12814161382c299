use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::agent_engine::state::{LoopState, TaskStep};

/// Notifications published by the automation loop. Overlay UI, speech
/// feedback and the voice pipeline subscribe instead of registering callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AutomationEvent {
    StateChanged {
        run_id: String,
        state: LoopState,
    },
    StepRecorded {
        run_id: String,
        step: TaskStep,
    },
    Finished {
        run_id: String,
        success: bool,
        error: Option<String>,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AutomationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AutomationEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers; having none is not an error.
    pub fn publish(&self, event: AutomationEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("automation event dropped: no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
