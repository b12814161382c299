/// Lifecycle states of the automation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// What kind of UI interaction a step performed. Used to check that typing
/// only follows a focus or search step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    /// Tap that focused an editable field.
    InputFocus,
    /// Tap on a search affordance or a search key event.
    SearchInitiation,
    Tap,
    LongPress,
    Swipe,
    Scroll,
    Type,
    KeyEvent,
    AppLaunch,
    Navigation,
    Wait,
    Rejected,
    None,
}

impl InteractionType {
    pub fn enables_typing(self) -> bool {
        matches!(
            self,
            InteractionType::InputFocus | InteractionType::SearchInitiation
        )
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskStep {
    pub step_number: u32,
    pub action: String,
    pub parameters: serde_json::Value,
    pub description: String,
    pub success: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub interaction: InteractionType,
}

/// Final result of one automation run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskOutcome {
    pub run_id: String,
    pub state: LoopState,
    pub steps: Vec<TaskStep>,
    pub summary: Option<String>,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == LoopState::Completed
    }
}
