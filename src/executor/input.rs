// Device input primitives, implemented by the platform gesture dispatcher.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ClawResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn reversed(self) -> Self {
        match self {
            ScrollDirection::Up => ScrollDirection::Down,
            ScrollDirection::Down => ScrollDirection::Up,
            ScrollDirection::Left => ScrollDirection::Right,
            ScrollDirection::Right => ScrollDirection::Left,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" => Some(ScrollDirection::Up),
            "down" => Some(ScrollDirection::Down),
            "left" => Some(ScrollDirection::Left),
            "right" => Some(ScrollDirection::Right),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        }
    }
}

impl std::fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Android key codes the agent can send.
pub mod keycode {
    pub const BACK: i32 = 4;
    pub const TAB: i32 = 61;
    pub const ENTER: i32 = 66;
    pub const DEL: i32 = 67;
    pub const MENU: i32 = 82;
    pub const SEARCH: i32 = 84;
    pub const ESCAPE: i32 = 111;

    pub fn from_name(name: &str) -> Option<i32> {
        match name.trim().to_lowercase().as_str() {
            "back" => Some(BACK),
            "tab" => Some(TAB),
            "enter" | "return" => Some(ENTER),
            "delete" | "del" | "backspace" => Some(DEL),
            "menu" => Some(MENU),
            "search" => Some(SEARCH),
            "escape" | "esc" => Some(ESCAPE),
            _ => None,
        }
    }
}

/// Gesture and key primitives. Each call returns once the platform has
/// accepted (or rejected) the action; layout settling is the caller's concern.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn tap(&self, x: i32, y: i32) -> ClawResult<()>;

    async fn long_press(&self, x: i32, y: i32, duration_ms: u64) -> ClawResult<()>;

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> ClawResult<()>;

    async fn scroll(&self, direction: ScrollDirection) -> ClawResult<()>;

    async fn type_text(&self, text: &str, clear_first: bool, delay_ms: u64) -> ClawResult<()>;

    async fn key_event(&self, code: i32) -> ClawResult<()>;

    async fn open_app_by_name(&self, name: &str) -> ClawResult<()>;

    async fn back(&self) -> ClawResult<()>;

    async fn home(&self) -> ClawResult<()>;
}
