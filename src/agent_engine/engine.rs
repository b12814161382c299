use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::Instrument;

use crate::agent_engine::event_bus::{AutomationEvent, EventBus};
use crate::agent_engine::history::StepHistory;
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{InteractionType, LoopState, TaskOutcome, TaskStep};
use crate::config::AppConfig;
use crate::errors::{ClawError, ClawResult};
use crate::executor::dispatcher::ActionDispatcher;
use crate::executor::input::ActionExecutor;
use crate::executor::safety::validate_sequence;
use crate::executor::text_input::ProcessedFieldSet;
use crate::llm::client::DecisionClient;
use crate::llm::decision::{Decision, DecisionAction};
use crate::llm::prompt::{build_prompt, PromptInput};
use crate::llm::provider::DecisionOracle;
use crate::perception::context::ContextBuilder;
use crate::perception::stability::StabilityTracker;
use crate::perception::traits::ScreenInspector;

/// How a run ended, before it is folded into a `TaskOutcome`.
struct RunEnd {
    state: LoopState,
    summary: Option<String>,
    error: Option<String>,
}

impl RunEnd {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            state: LoopState::Failed,
            summary: None,
            error: Some(error.into()),
        }
    }
}

/// Observe → decide → validate → act, until the oracle reports completion,
/// a terminal error occurs, or the run is stopped.
pub struct AutomationLoop {
    contexts: Arc<ContextBuilder>,
    client: DecisionClient,
    dispatcher: ActionDispatcher,
    control: LoopController,
    events: EventBus,
    state: Mutex<LoopState>,
    closed: AtomicBool,
}

impl AutomationLoop {
    pub fn new(
        inspector: Arc<dyn ScreenInspector>,
        executor: Arc<dyn ActionExecutor>,
        oracle: Arc<dyn DecisionOracle>,
        config: &AppConfig,
        events: EventBus,
    ) -> Self {
        let contexts = Arc::new(ContextBuilder::new(inspector, config.context.clone()));
        let dispatcher = ActionDispatcher::new(
            executor,
            contexts.clone(),
            config.resolver.clone(),
            config.scroller.clone(),
            config.automation.type_delay_ms,
        );
        Self {
            client: DecisionClient::new(oracle, config.oracle.min_interval()),
            control: LoopController::new(config.automation.clone()),
            contexts,
            dispatcher,
            events,
            state: Mutex::new(LoopState::Idle),
            closed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Ask a running loop to stop at the next iteration boundary.
    /// Returns false when nothing is running.
    pub fn stop(&self) -> bool {
        if self.state() != LoopState::Running {
            return false;
        }
        tracing::info!("stop requested");
        self.control.request_stop();
        true
    }

    /// Refuse all future runs and stop the current one.
    pub fn shutdown(&self) -> bool {
        // Set before `stop` reads the state; a racing `start` checks it under the state lock.
        self.closed.store(true, Ordering::SeqCst);
        self.stop()
    }

    /// Run `task` to completion. Only one run may be active; a second call
    /// while running returns `Busy`, any call after `shutdown` `Cancelled`.
    pub async fn start(&self, task: &str) -> ClawResult<TaskOutcome> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if self.closed.load(Ordering::SeqCst) {
                return Err(ClawError::Cancelled);
            }
            if *state != LoopState::Idle {
                return Err(ClawError::Busy);
            }
            self.control.reset();
            *state = LoopState::Running;
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        self.events.publish(AutomationEvent::StateChanged {
            run_id: run_id.clone(),
            state: LoopState::Running,
        });

        let span = tracing::info_span!("automation_run", run_id = %run_id);
        let mut history = StepHistory::new();
        let end = self
            .run(task, &run_id, &mut history)
            .instrument(span)
            .await;

        tracing::info!(
            run_id = %run_id,
            state = ?end.state,
            steps = history.len(),
            error = end.error.as_deref().unwrap_or(""),
            "automation run finished"
        );
        self.set_state(&run_id, end.state);
        self.events.publish(AutomationEvent::Finished {
            run_id: run_id.clone(),
            success: end.state == LoopState::Completed,
            error: end.error.clone(),
        });
        self.set_state(&run_id, LoopState::Idle);

        Ok(TaskOutcome {
            run_id,
            state: end.state,
            steps: history.into_steps(),
            summary: end.summary,
            error: end.error,
        })
    }

    fn set_state(&self, run_id: &str, state: LoopState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.events.publish(AutomationEvent::StateChanged {
            run_id: run_id.to_string(),
            state,
        });
    }

    async fn run(&self, task: &str, run_id: &str, history: &mut StepHistory) -> RunEnd {
        let cfg = self.control.config();
        let mut fields = ProcessedFieldSet::new();
        let mut tracker = StabilityTracker::new(cfg.unchanged_depth, cfg.unchanged_window());
        let mut last_action: Option<DecisionAction> = None;
        let mut step_number = 0u32;

        tracing::info!(task = %task, "automation run started");

        loop {
            if self.control.should_stop() {
                tracing::info!(steps = history.len(), "run cancelled");
                return RunEnd {
                    state: LoopState::Cancelled,
                    summary: None,
                    error: Some(ClawError::Cancelled.to_string()),
                };
            }

            // ── Observe ───────────────────────────────────────────────────
            let ctx = self.contexts.capture().await;
            fields.observe_screen(&ctx.current_app);

            let after_gesture = last_action.as_ref().is_some_and(DecisionAction::is_gesture);
            if !after_gesture && tracker.is_unchanged(&ctx, Instant::now()) {
                tracing::debug!("screen unchanged since last decision — waiting");
                tokio::time::sleep(cfg.unchanged_retry()).await;
                continue;
            }
            tracker.record(&ctx, Instant::now());

            // ── Decide ────────────────────────────────────────────────────
            step_number += 1;
            let prompt = build_prompt(&PromptInput {
                task,
                step_number,
                history: history.steps(),
                history_window: cfg.history_window,
                context: &ctx,
            });
            let decision = match self.client.decide(&prompt).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!(error = %e, step = step_number, "no decision from oracle");
                    self.record(
                        run_id,
                        history,
                        failed_step(step_number, "decide", serde_json::Value::Null, &e, InteractionType::None),
                    );
                    return RunEnd::failed(e.to_string());
                }
            };
            tracing::info!(
                step = step_number,
                action = %decision.action.name(),
                description = %decision.description,
                complete = decision.is_complete,
                "decision received"
            );

            // ── Validate ──────────────────────────────────────────────────
            if let Err(e) = validate_sequence(&decision.action, history) {
                tracing::warn!(error = %e, "decision rejected");
                self.record(
                    run_id,
                    history,
                    failed_step(
                        step_number,
                        decision.action.name(),
                        decision.parameters.clone(),
                        &e,
                        InteractionType::Rejected,
                    ),
                );
                // The screen has not moved; ask again right away with the rejection in history.
                tracker.reset();
                last_action = None;
                continue;
            }

            // ── Act ───────────────────────────────────────────────────────
            match self.dispatcher.dispatch(&decision.action, &ctx, &mut fields).await {
                Ok(done) => {
                    let step = TaskStep {
                        step_number,
                        action: decision.action.name().to_string(),
                        parameters: decision.parameters.clone(),
                        description: step_description(&decision, &done.message),
                        success: true,
                        timestamp: chrono::Utc::now(),
                        interaction: done.interaction,
                    };
                    self.record(run_id, history, step);
                }
                Err(e) if e.is_terminal() => {
                    tracing::error!(error = %e, step = step_number, "action failed");
                    self.record(
                        run_id,
                        history,
                        failed_step(
                            step_number,
                            decision.action.name(),
                            decision.parameters.clone(),
                            &e,
                            InteractionType::None,
                        ),
                    );
                    return RunEnd::failed(e.to_string());
                }
                Err(e) => {
                    tracing::warn!(error = %e, step = step_number, "action had no effect");
                    self.record(
                        run_id,
                        history,
                        failed_step(
                            step_number,
                            decision.action.name(),
                            decision.parameters.clone(),
                            &e,
                            InteractionType::None,
                        ),
                    );
                    tracker.reset();
                }
            }

            if decision.is_complete || decision.action == DecisionAction::Finish {
                let summary = if decision.description.is_empty() {
                    "Task complete".to_string()
                } else {
                    decision.description.clone()
                };
                tracing::info!(steps = history.len(), summary = %summary, "task complete");
                return RunEnd {
                    state: LoopState::Completed,
                    summary: Some(summary),
                    error: None,
                };
            }

            tokio::time::sleep(self.control.wait_after(&decision.action)).await;
            last_action = Some(decision.action);
        }
    }

    fn record(&self, run_id: &str, history: &mut StepHistory, step: TaskStep) {
        self.events.publish(AutomationEvent::StepRecorded {
            run_id: run_id.to_string(),
            step: step.clone(),
        });
        history.push(step);
    }
}

fn step_description(decision: &Decision, message: &str) -> String {
    if decision.description.is_empty() {
        message.to_string()
    } else {
        format!("{} ({message})", decision.description)
    }
}

fn failed_step(
    step_number: u32,
    action: &str,
    parameters: serde_json::Value,
    error: &ClawError,
    interaction: InteractionType,
) -> TaskStep {
    TaskStep {
        step_number,
        action: action.to_string(),
        parameters,
        description: error.to_string(),
        success: false,
        timestamp: chrono::Utc::now(),
        interaction,
    }
}
