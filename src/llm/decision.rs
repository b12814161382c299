/// Oracle decision contract.
///
/// The oracle answers with one JSON object:
/// `{"action": "<name>", "parameters": {...}, "description": "...",
///   "reasoning": "...", "isComplete": false}`
/// possibly wrapped in markdown fences and prose. The object is located by
/// taking everything between the first `{` and the last `}` after stripping
/// fences, and turned into a typed `DecisionAction`.
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::executor::input::{keycode, ScrollDirection};
use crate::perception::types::Bounds;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionAction {
    TapElementByIndex { index: usize },
    TapElementByText { text: String },
    TapElementByBounds { bounds: Bounds },
    OcrTapByText { text: String },
    OcrTapByBounds { bounds: Bounds },
    LongPressElementByIndex { index: usize, duration_ms: u64 },
    Swipe { x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64 },
    Scroll { direction: ScrollDirection },
    DynamicScroll {
        direction: ScrollDirection,
        target_text: Option<String>,
        max_attempts: Option<u32>,
    },
    TypeText { text: String, clear_first: bool },
    TypeInField { index: usize, text: String, clear_first: bool },
    TypeInOcrField { label: String, text: String, clear_first: bool },
    KeyEvent { code: i32 },
    OpenAppByName { app_name: String },
    Back,
    Home,
    Wait { duration_ms: u64 },
    /// No further action; only produced together with `is_complete`.
    Finish,
    Unrecognized { name: String, detail: String },
}

impl DecisionAction {
    /// Wire name as used in the prompt vocabulary.
    pub fn name(&self) -> &str {
        match self {
            DecisionAction::TapElementByIndex { .. } => "tap_element_by_index",
            DecisionAction::TapElementByText { .. } => "tap_element_by_text",
            DecisionAction::TapElementByBounds { .. } => "tap_element_by_bounds",
            DecisionAction::OcrTapByText { .. } => "ocr_tap_by_text",
            DecisionAction::OcrTapByBounds { .. } => "ocr_tap_by_bounds",
            DecisionAction::LongPressElementByIndex { .. } => "long_press_element_by_index",
            DecisionAction::Swipe { .. } => "swipe",
            DecisionAction::Scroll { .. } => "scroll",
            DecisionAction::DynamicScroll { .. } => "dynamic_scroll",
            DecisionAction::TypeText { .. } => "type_text",
            DecisionAction::TypeInField { .. } => "type_in_field",
            DecisionAction::TypeInOcrField { .. } => "type_in_ocr_field",
            DecisionAction::KeyEvent { .. } => "key_event",
            DecisionAction::OpenAppByName { .. } => "open_app_by_name",
            DecisionAction::Back => "back",
            DecisionAction::Home => "home",
            DecisionAction::Wait { .. } => "wait",
            DecisionAction::Finish => "finish",
            DecisionAction::Unrecognized { name, .. } => name,
        }
    }

    pub fn is_gesture(&self) -> bool {
        matches!(
            self,
            DecisionAction::Swipe { .. }
                | DecisionAction::Scroll { .. }
                | DecisionAction::DynamicScroll { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub action: DecisionAction,
    /// Raw `parameters` object, kept for step history.
    pub parameters: Value,
    pub description: String,
    pub reasoning: String,
    pub is_complete: bool,
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("static regex"))
}

/// Remove markdown code fences and return the `{ … }` span, if any.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Parse a raw oracle response. `None` means "no decision".
pub fn parse_decision(raw: &str) -> Option<Decision> {
    let cleaned = fence_re().replace_all(raw, "");
    let json = extract_json_object(&cleaned)?;
    let value: Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "oracle response is not valid JSON");
            return None;
        }
    };
    let obj = value.as_object()?;

    let is_complete = obj
        .get("isComplete")
        .or_else(|| obj.get("is_complete"))
        .and_then(as_bool_lenient)
        .unwrap_or(false);
    let parameters = obj
        .get("parameters")
        .or_else(|| obj.get("params"))
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    let action_name = obj
        .get("action")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && s != "none" && s != "null");

    let action = match action_name {
        Some(name) => parse_action(&name, &parameters),
        None if is_complete => DecisionAction::Finish,
        None => return None,
    };

    Some(Decision {
        action,
        parameters,
        description: text_field(obj, "description"),
        reasoning: text_field(obj, "reasoning"),
        is_complete,
    })
}

fn text_field(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    obj.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

fn as_bool_lenient(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn get<'a>(args: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| args.get(*k)).filter(|v| !v.is_null())
}

fn get_str(args: &Value, keys: &[&str]) -> Option<String> {
    get(args, keys).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn get_i64(args: &Value, keys: &[&str]) -> Option<i64> {
    get(args, keys).and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn get_bool(args: &Value, keys: &[&str]) -> Option<bool> {
    get(args, keys).and_then(as_bool_lenient)
}

/// Accepts `[l, t, r, b]` or `{left, top, right, bottom}`.
fn get_bounds(args: &Value, keys: &[&str]) -> Option<Bounds> {
    let v = get(args, keys)?;
    let num = |v: &Value| v.as_f64().map(|f| f.round() as i32);
    if let Some(arr) = v.as_array() {
        if arr.len() == 4 {
            return Some(Bounds::new(num(&arr[0])?, num(&arr[1])?, num(&arr[2])?, num(&arr[3])?));
        }
        return None;
    }
    Some(Bounds::new(
        num(v.get("left")?)?,
        num(v.get("top")?)?,
        num(v.get("right")?)?,
        num(v.get("bottom")?)?,
    ))
}

fn get_index(args: &Value) -> Option<usize> {
    get_i64(args, &["index", "elementIndex", "element_index"])
        .and_then(|i| usize::try_from(i).ok())
}

fn get_direction(args: &Value) -> Option<ScrollDirection> {
    get_str(args, &["direction"]).and_then(|d| ScrollDirection::parse(&d))
}

fn get_duration(args: &Value, default: u64) -> u64 {
    get_i64(args, &["durationMs", "duration_ms", "duration"])
        .and_then(|d| u64::try_from(d).ok())
        .unwrap_or(default)
}

fn parse_action(name: &str, args: &Value) -> DecisionAction {
    let missing = |what: &str| DecisionAction::Unrecognized {
        name: name.to_string(),
        detail: format!("missing or invalid parameter `{what}`"),
    };
    let clear_first = get_bool(args, &["clearFirst", "clear_first"]).unwrap_or(false);

    match name {
        "tap_element_by_index" | "tap_element" => match get_index(args) {
            Some(index) => DecisionAction::TapElementByIndex { index },
            None => missing("index"),
        },
        "tap_element_by_text" => match get_str(args, &["text", "targetText", "target_text"]) {
            Some(text) => DecisionAction::TapElementByText { text },
            None => missing("text"),
        },
        "tap_element_by_bounds" => match get_bounds(args, &["bounds"]) {
            Some(bounds) => DecisionAction::TapElementByBounds { bounds },
            None => missing("bounds"),
        },
        "ocr_tap_by_text" => match get_str(args, &["text", "targetText", "target_text"]) {
            Some(text) => DecisionAction::OcrTapByText { text },
            None => missing("text"),
        },
        "ocr_tap_by_bounds" => match get_bounds(args, &["bounds"]) {
            Some(bounds) => DecisionAction::OcrTapByBounds { bounds },
            None => missing("bounds"),
        },
        "long_press_element_by_index" | "long_press" => match get_index(args) {
            Some(index) => DecisionAction::LongPressElementByIndex {
                index,
                duration_ms: get_duration(args, 800),
            },
            None => missing("index"),
        },
        "swipe" => {
            let coords = (
                get_i64(args, &["x1", "startX", "start_x"]),
                get_i64(args, &["y1", "startY", "start_y"]),
                get_i64(args, &["x2", "endX", "end_x"]),
                get_i64(args, &["y2", "endY", "end_y"]),
            );
            match coords {
                (Some(x1), Some(y1), Some(x2), Some(y2)) => DecisionAction::Swipe {
                    x1: x1 as i32,
                    y1: y1 as i32,
                    x2: x2 as i32,
                    y2: y2 as i32,
                    duration_ms: get_duration(args, 300),
                },
                _ => missing("x1/y1/x2/y2"),
            }
        }
        "scroll" => match get_direction(args) {
            Some(direction) => DecisionAction::Scroll { direction },
            None => missing("direction"),
        },
        "dynamic_scroll" => match get_direction(args) {
            Some(direction) => DecisionAction::DynamicScroll {
                direction,
                target_text: get_str(args, &["targetText", "target_text", "text"]),
                max_attempts: get_i64(args, &["maxAttempts", "max_attempts"])
                    .and_then(|n| u32::try_from(n).ok()),
            },
            None => missing("direction"),
        },
        "type_text" | "type" => match get_str(args, &["text"]) {
            Some(text) => DecisionAction::TypeText { text, clear_first },
            None => missing("text"),
        },
        "type_in_field" | "advanced_type" => match (get_index(args), get_str(args, &["text"])) {
            (Some(index), Some(text)) => DecisionAction::TypeInField {
                index,
                text,
                clear_first,
            },
            _ => missing("index/text"),
        },
        "type_in_ocr_field" => match (
            get_str(args, &["label", "fieldText", "field_text", "target"]),
            get_str(args, &["text"]),
        ) {
            (Some(label), Some(text)) => DecisionAction::TypeInOcrField {
                label,
                text,
                clear_first,
            },
            _ => missing("label/text"),
        },
        "key_event" | "press_key" => {
            let code = get_i64(args, &["code", "keyCode", "key_code"])
                .map(|c| c as i32)
                .or_else(|| get_str(args, &["key", "name"]).and_then(|k| keycode::from_name(&k)));
            match code {
                Some(code) => DecisionAction::KeyEvent { code },
                None => missing("code"),
            }
        }
        "open_app_by_name" | "open_app" => match get_str(args, &["appName", "app_name", "name"]) {
            Some(app_name) => DecisionAction::OpenAppByName { app_name },
            None => missing("appName"),
        },
        "back" | "navigate_back" => DecisionAction::Back,
        "home" | "navigate_home" => DecisionAction::Home,
        "wait" => DecisionAction::Wait {
            duration_ms: get_duration(args, 1000),
        },
        "finish" | "complete" | "done" => DecisionAction::Finish,
        other => DecisionAction::Unrecognized {
            name: other.to_string(),
            detail: "unknown action".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARE: &str = r#"{"action":"tap_element_by_index","parameters":{"index":3},"description":"Tap Wi-Fi","reasoning":"toggle is at 3","isComplete":false}"#;

    #[test]
    fn fenced_json_with_prose_parses_like_bare_json() {
        let wrapped = format!("Sure! Here is the next step:\n```json\n{BARE}\n```\nLet me know.");
        let a = parse_decision(BARE).unwrap();
        let b = parse_decision(&wrapped).unwrap();
        assert_eq!(a.action, b.action);
        assert_eq!(a.description, b.description);
        assert_eq!(a.is_complete, b.is_complete);
        assert_eq!(a.action, DecisionAction::TapElementByIndex { index: 3 });
    }

    #[test]
    fn garbage_yields_no_decision() {
        assert!(parse_decision("I cannot help with that").is_none());
        assert!(parse_decision("{not json}").is_none());
        assert!(parse_decision(r#"{"description":"thinking"}"#).is_none());
    }

    #[test]
    fn completion_without_action_is_finish() {
        let d = parse_decision(r#"{"isComplete": true, "description": "Wi-Fi is on"}"#).unwrap();
        assert_eq!(d.action, DecisionAction::Finish);
        assert!(d.is_complete);
    }

    #[test]
    fn camel_and_snake_parameters_are_accepted() {
        let a = parse_decision(r#"{"action":"open_app_by_name","parameters":{"appName":"Settings"}}"#)
            .unwrap();
        let b = parse_decision(r#"{"action":"open_app_by_name","parameters":{"app_name":"Settings"}}"#)
            .unwrap();
        assert_eq!(a.action, b.action);
        assert_eq!(
            a.action,
            DecisionAction::OpenAppByName {
                app_name: "Settings".into()
            }
        );
    }

    #[test]
    fn bounds_accept_array_or_object() {
        let a = parse_decision(r#"{"action":"tap_element_by_bounds","parameters":{"bounds":[0,10,100,110]}}"#)
            .unwrap();
        let b = parse_decision(
            r#"{"action":"tap_element_by_bounds","parameters":{"bounds":{"left":0,"top":10,"right":100,"bottom":110}}}"#,
        )
        .unwrap();
        assert_eq!(a.action, b.action);
    }

    #[test]
    fn unknown_or_incomplete_actions_are_unrecognized() {
        let d = parse_decision(r#"{"action":"teleport","parameters":{}}"#).unwrap();
        assert!(matches!(d.action, DecisionAction::Unrecognized { ref name, .. } if name == "teleport"));
        let d = parse_decision(r#"{"action":"tap_element_by_index","parameters":{}}"#).unwrap();
        assert!(matches!(d.action, DecisionAction::Unrecognized { .. }));
    }

    #[test]
    fn key_names_resolve_to_codes() {
        let d = parse_decision(r#"{"action":"key_event","parameters":{"key":"enter"}}"#).unwrap();
        assert_eq!(d.action, DecisionAction::KeyEvent { code: keycode::ENTER });
    }
}
