/// Session: owns the automation loop, the voice queue and the event bus.
///
/// Created once by the host with its platform bridges and torn down when
/// the host goes away. Voice tasks started by the queue are dispatched onto
/// the tokio runtime; each one listens for its command (unless it already
/// carries one), runs it through the loop, then hands the session to the
/// next queued task.
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::engine::AutomationLoop;
use crate::agent_engine::event_bus::{AutomationEvent, EventBus};
use crate::agent_engine::state::{LoopState, TaskOutcome};
use crate::config::AppConfig;
use crate::errors::ClawResult;
use crate::executor::input::ActionExecutor;
use crate::llm::provider::DecisionOracle;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::perception::traits::ScreenInspector;
use crate::voice::queue::VoiceTaskQueue;
use crate::voice::source::CommandSource;
use crate::voice::types::{VoiceTask, VoiceTaskStatus};

const EVENT_CAPACITY: usize = 100;

pub struct Session {
    engine: Arc<AutomationLoop>,
    queue: VoiceTaskQueue,
    commands: Arc<dyn CommandSource>,
    events: EventBus,
}

impl Session {
    pub fn new(
        inspector: Arc<dyn ScreenInspector>,
        executor: Arc<dyn ActionExecutor>,
        oracle: Arc<dyn DecisionOracle>,
        commands: Arc<dyn CommandSource>,
        config: &AppConfig,
    ) -> Arc<Self> {
        let events = EventBus::new(EVENT_CAPACITY);
        let engine = Arc::new(AutomationLoop::new(
            inspector,
            executor,
            oracle,
            config,
            events.clone(),
        ));
        tracing::info!(oracle = %config.oracle.display_name, "session created");
        Arc::new(Self {
            engine,
            queue: VoiceTaskQueue::new(Duration::from_secs(config.voice.retention_secs)),
            commands,
            events,
        })
    }

    /// Session backed by the OpenAI-compatible oracle described in `config.oracle`.
    pub fn with_configured_oracle(
        inspector: Arc<dyn ScreenInspector>,
        executor: Arc<dyn ActionExecutor>,
        commands: Arc<dyn CommandSource>,
        config: &AppConfig,
    ) -> ClawResult<Arc<Self>> {
        let oracle = OpenAiCompatibleProvider::from_config(&config.oracle)?;
        Ok(Self::new(inspector, executor, Arc::new(oracle), commands, config))
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AutomationEvent> {
        self.events.subscribe()
    }

    pub fn queue(&self) -> &VoiceTaskQueue {
        &self.queue
    }

    pub fn state(&self) -> LoopState {
        self.engine.state()
    }

    /// Voice entry point: queue an invocation and start it if the session is free.
    pub fn enqueue(self: &Arc<Self>, wake_word_detected: bool) -> VoiceTask {
        let outcome = self.queue.enqueue(wake_word_detected);
        if let Some(task) = outcome.started {
            self.dispatch(task);
        }
        outcome.task
    }

    /// Like `enqueue`, for a command recognized before the task was queued.
    pub fn enqueue_command(self: &Arc<Self>, wake_word_detected: bool, command: &str) -> VoiceTask {
        let outcome = self.queue.enqueue_command(wake_word_detected, command);
        if let Some(task) = outcome.started {
            self.dispatch(task);
        }
        outcome.task
    }

    /// Run a typed task directly, bypassing the voice queue.
    pub async fn run_task(&self, task: &str) -> ClawResult<TaskOutcome> {
        self.engine.start(task).await
    }

    pub fn stop(&self) -> bool {
        self.engine.stop()
    }

    /// Cancel queued voice tasks, stop the running one and refuse any later run.
    /// A task still listening for its command is dropped once it hears one.
    pub fn teardown(&self) {
        let cancelled = self.queue.teardown();
        let stopped = self.engine.shutdown();
        tracing::info!(cancelled, stopped, "session torn down");
    }

    fn dispatch(self: &Arc<Self>, task: VoiceTask) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let id = task.id;
            session.process(task).await;
            if let Some(next) = session.queue.complete(id) {
                session.dispatch(next);
            }
        });
    }

    async fn process(&self, task: VoiceTask) {
        let command = match task.command.clone() {
            Some(c) => Some(c),
            None => match self.commands.listen_for_command(&task).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(id = task.id, error = %e, "listening for command failed");
                    None
                }
            },
        };
        let Some(command) = command.filter(|c| !c.trim().is_empty()) else {
            tracing::info!(id = task.id, "no command heard");
            return;
        };

        if self.queue.status(task.id) != Some(VoiceTaskStatus::Processing) {
            tracing::info!(id = task.id, "voice task cancelled while listening");
            return;
        }
        tracing::info!(id = task.id, command = %command, "voice command received");
        match self.engine.start(&command).await {
            Ok(outcome) => tracing::info!(
                id = task.id,
                state = ?outcome.state,
                steps = outcome.steps.len(),
                "voice task finished"
            ),
            Err(e) => tracing::warn!(id = task.id, error = %e, "voice task not run"),
        }
    }
}
