use crate::agent_engine::state::{InteractionType, TaskStep};

/// Append-only step log of the current run.
#[derive(Debug, Default)]
pub struct StepHistory {
    steps: Vec<TaskStep>,
}

impl StepHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: TaskStep) {
        tracing::debug!(
            step = step.step_number,
            action = %step.action,
            success = step.success,
            "step recorded"
        );
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[TaskStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Interaction types of the last `n` successful steps, newest first.
    pub fn recent_interactions(&self, n: usize) -> Vec<InteractionType> {
        self.steps
            .iter()
            .rev()
            .filter(|s| s.success)
            .take(n)
            .map(|s| s.interaction)
            .collect()
    }

    pub fn into_steps(self) -> Vec<TaskStep> {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, success: bool, interaction: InteractionType) -> TaskStep {
        TaskStep {
            step_number: n,
            action: "x".into(),
            parameters: serde_json::Value::Null,
            description: String::new(),
            success,
            timestamp: chrono::Utc::now(),
            interaction,
        }
    }

    #[test]
    fn recent_interactions_skip_failures() {
        let mut h = StepHistory::new();
        h.push(step(1, true, InteractionType::InputFocus));
        h.push(step(2, false, InteractionType::Rejected));
        h.push(step(3, true, InteractionType::Wait));
        assert_eq!(
            h.recent_interactions(2),
            vec![InteractionType::Wait, InteractionType::InputFocus]
        );
    }
}
