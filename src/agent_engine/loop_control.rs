// Loop pacing and cooperative cancellation.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::AutomationConfig;
use crate::llm::decision::DecisionAction;

pub struct LoopController {
    config: AutomationConfig,
    stop_requested: AtomicBool,
}

impl LoopController {
    pub fn new(config: AutomationConfig) -> Self {
        Self {
            config,
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.stop_requested.store(false, Ordering::Release);
    }

    /// Checked only between iterations; in-flight work is never interrupted.
    pub fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Settling time after an action. Gestures settle asynchronously and need
    /// seconds; taps and typing need a few hundred milliseconds.
    pub fn wait_after(&self, action: &DecisionAction) -> Duration {
        let ms = match action {
            DecisionAction::Swipe { .. } | DecisionAction::Scroll { .. } => self.config.gesture_wait_ms,
            // The scroller already waited after its last scroll.
            DecisionAction::DynamicScroll { .. } => self.config.tap_wait_ms,
            DecisionAction::OpenAppByName { .. } => self.config.app_launch_wait_ms,
            DecisionAction::TypeText { .. }
            | DecisionAction::TypeInField { .. }
            | DecisionAction::TypeInOcrField { .. } => self.config.type_wait_ms,
            DecisionAction::Wait { .. }
            | DecisionAction::Finish
            | DecisionAction::Unrecognized { .. } => 0,
            _ => self.config.tap_wait_ms,
        };
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::input::ScrollDirection;

    #[test]
    fn gestures_wait_longer_than_taps() {
        let ctrl = LoopController::new(AutomationConfig::default());
        let scroll = ctrl.wait_after(&DecisionAction::Scroll {
            direction: ScrollDirection::Down,
        });
        let tap = ctrl.wait_after(&DecisionAction::TapElementByIndex { index: 0 });
        assert!(scroll >= Duration::from_secs(1));
        assert!(tap < Duration::from_secs(1));
        assert!(scroll > tap);
    }

    #[test]
    fn stop_flag_round_trip() {
        let ctrl = LoopController::new(AutomationConfig::default());
        assert!(!ctrl.should_stop());
        ctrl.request_stop();
        assert!(ctrl.should_stop());
        ctrl.reset();
        assert!(!ctrl.should_stop());
    }
}
