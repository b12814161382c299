// Local checks applied to an oracle decision before anything touches the device.
use crate::agent_engine::history::StepHistory;
use crate::errors::{ClawError, ClawResult};
use crate::llm::decision::DecisionAction;

/// How many preceding steps may carry the focus that a bare `type_text` relies on.
pub const FOCUS_LOOKBACK: usize = 2;

/// Reject decisions that cannot be executed as given.
///
/// - `Unrecognized` actions are rejected outright.
/// - A bare `type_text` needs a field focus or search initiation among the
///   last `FOCUS_LOOKBACK` successful steps; otherwise the keystrokes would
///   land nowhere.
pub fn validate_sequence(action: &DecisionAction, history: &StepHistory) -> ClawResult<()> {
    match action {
        DecisionAction::Unrecognized { name, detail } => Err(ClawError::SequenceViolation(format!(
            "action `{name}` rejected: {detail}. Use one of the listed actions."
        ))),
        DecisionAction::TypeText { .. } => {
            let focused = history
                .recent_interactions(FOCUS_LOOKBACK)
                .into_iter()
                .any(|i| i.enables_typing());
            if focused {
                Ok(())
            } else {
                Err(ClawError::SequenceViolation(
                    "type_text rejected: no input field is focused. Tap the field first \
                     (tap_element_by_index on an editable element) or use type_in_field."
                        .into(),
                ))
            }
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::{InteractionType, TaskStep};

    fn push(h: &mut StepHistory, interaction: InteractionType) {
        let n = h.len() as u32 + 1;
        h.push(TaskStep {
            step_number: n,
            action: "x".into(),
            parameters: serde_json::Value::Null,
            description: String::new(),
            success: true,
            timestamp: chrono::Utc::now(),
            interaction,
        });
    }

    fn type_text() -> DecisionAction {
        DecisionAction::TypeText {
            text: "wifi".into(),
            clear_first: false,
        }
    }

    #[test]
    fn bare_type_needs_recent_focus() {
        let mut h = StepHistory::new();
        assert!(matches!(
            validate_sequence(&type_text(), &h),
            Err(ClawError::SequenceViolation(_))
        ));
        push(&mut h, InteractionType::InputFocus);
        push(&mut h, InteractionType::Wait);
        assert!(validate_sequence(&type_text(), &h).is_ok());
        push(&mut h, InteractionType::Scroll);
        assert!(validate_sequence(&type_text(), &h).is_err());
    }

    #[test]
    fn search_initiation_enables_typing() {
        let mut h = StepHistory::new();
        push(&mut h, InteractionType::SearchInitiation);
        assert!(validate_sequence(&type_text(), &h).is_ok());
    }

    #[test]
    fn unrecognized_is_a_violation() {
        let h = StepHistory::new();
        let action = DecisionAction::Unrecognized {
            name: "fly".into(),
            detail: "unknown action".into(),
        };
        assert!(matches!(
            validate_sequence(&action, &h),
            Err(ClawError::SequenceViolation(_))
        ));
        assert!(validate_sequence(&DecisionAction::Back, &h).is_ok());
    }
}
