/// Voice task queue: FIFO arbitration of wake-word invocations.
///
/// A wake event cancels everything still waiting and queues a fresh task;
/// at most one task is `Processing` at any time. Starting a task only flips
/// its status here: the caller receives the task and dispatches it.
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;

use crate::voice::types::{EnqueueOutcome, VoiceTask, VoiceTaskStatus};

struct QueueInner {
    tasks: VecDeque<VoiceTask>,
    next_id: u64,
    closed: bool,
}

pub struct VoiceTaskQueue {
    inner: Mutex<QueueInner>,
    retention: Duration,
}

impl VoiceTaskQueue {
    pub fn new(retention: Duration) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                tasks: VecDeque::new(),
                next_id: 1,
                closed: false,
            }),
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, wake_word_detected: bool) -> EnqueueOutcome {
        self.push(wake_word_detected, None)
    }

    /// Enqueue with the command already recognized.
    pub fn enqueue_command(&self, wake_word_detected: bool, command: impl Into<String>) -> EnqueueOutcome {
        self.push(wake_word_detected, Some(command.into()))
    }

    fn push(&self, wake_word_detected: bool, command: Option<String>) -> EnqueueOutcome {
        let mut inner = self.lock();

        let mut cancelled = Vec::new();
        if wake_word_detected {
            for t in inner.tasks.iter_mut().filter(|t| t.status == VoiceTaskStatus::Pending) {
                t.finish(VoiceTaskStatus::Cancelled);
                cancelled.push(t.id);
            }
            if !cancelled.is_empty() {
                tracing::info!(?cancelled, "wake word: cancelled pending voice tasks");
            }
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let mut task = VoiceTask {
            id,
            wake_word_detected,
            command,
            timestamp: Utc::now(),
            status: VoiceTaskStatus::Pending,
            finished_at: None,
        };
        if inner.closed {
            tracing::warn!(id, "voice queue torn down, task cancelled on arrival");
            task.finish(VoiceTaskStatus::Cancelled);
        }
        inner.tasks.push_back(task.clone());
        tracing::debug!(id, wake_word_detected, queued = inner.tasks.len(), "voice task enqueued");

        let started = start_next(&mut inner);
        EnqueueOutcome {
            task,
            cancelled,
            started,
        }
    }

    /// Promote the first pending task unless one is already processing.
    pub fn process_next(&self) -> Option<VoiceTask> {
        start_next(&mut self.lock())
    }

    /// Mark `id` completed, prune old finished tasks and start the next one.
    pub fn complete(&self, id: u64) -> Option<VoiceTask> {
        let mut inner = self.lock();
        match inner.tasks.iter_mut().find(|t| t.id == id) {
            Some(t) if !t.status.is_finished() => t.finish(VoiceTaskStatus::Completed),
            Some(t) => tracing::debug!(id, status = ?t.status, "voice task already finished"),
            None => tracing::warn!(id, "completed unknown voice task"),
        }
        prune(&mut inner, self.retention);
        start_next(&mut inner)
    }

    /// Cancel everything not yet completed and refuse to start anything
    /// afterwards. Returns how many tasks were cancelled.
    pub fn teardown(&self) -> usize {
        let mut inner = self.lock();
        inner.closed = true;
        let mut n = 0;
        for t in inner.tasks.iter_mut().filter(|t| !t.status.is_finished()) {
            t.finish(VoiceTaskStatus::Cancelled);
            n += 1;
        }
        tracing::info!(cancelled = n, "voice queue torn down");
        n
    }

    pub fn status(&self, id: u64) -> Option<VoiceTaskStatus> {
        self.lock().tasks.iter().find(|t| t.id == id).map(|t| t.status)
    }

    pub fn processing(&self) -> Option<VoiceTask> {
        self.lock()
            .tasks
            .iter()
            .find(|t| t.status == VoiceTaskStatus::Processing)
            .cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.lock()
            .tasks
            .iter()
            .filter(|t| t.status == VoiceTaskStatus::Pending)
            .count()
    }

    pub fn snapshot(&self) -> Vec<VoiceTask> {
        self.lock().tasks.iter().cloned().collect()
    }
}

fn start_next(inner: &mut QueueInner) -> Option<VoiceTask> {
    if inner.closed || inner.tasks.iter().any(|t| t.status == VoiceTaskStatus::Processing) {
        return None;
    }
    let task = inner
        .tasks
        .iter_mut()
        .find(|t| t.status == VoiceTaskStatus::Pending)?;
    task.status = VoiceTaskStatus::Processing;
    tracing::info!(id = task.id, "voice task started");
    Some(task.clone())
}

fn prune(inner: &mut QueueInner, retention: Duration) {
    let now = Utc::now();
    let before = inner.tasks.len();
    inner.tasks.retain(|t| match (t.status.is_finished(), t.finished_at) {
        (true, Some(at)) => (now - at).to_std().map_or(true, |age| age < retention),
        _ => true,
    });
    let pruned = before - inner.tasks.len();
    if pruned > 0 {
        tracing::debug!(pruned, "finished voice tasks pruned");
    }
}
