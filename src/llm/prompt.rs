use std::fmt::Write as _;

use crate::agent_engine::state::TaskStep;
use crate::perception::types::{Element, ScreenContext};

pub const SYSTEM_PROMPT: &str = "\
You are PocketClaw, an agent that operates an Android phone on behalf of the user.
You see the screen as an accessibility tree and, when the tree is incomplete, as OCR text.
Choose exactly ONE next action per reply and answer with a single JSON object, nothing else.";

pub const ACTION_VOCABULARY: &str = r#"Available actions (name → parameters):
- tap_element_by_index       {"index": int}
- tap_element_by_text        {"text": string}
- tap_element_by_bounds      {"bounds": [left, top, right, bottom]}
- ocr_tap_by_text            {"text": string}          (tap text seen only in OCR)
- ocr_tap_by_bounds          {"bounds": [l, t, r, b]}   (OCR image coordinates)
- long_press_element_by_index {"index": int, "durationMs"?: int}
- swipe                      {"x1": int, "y1": int, "x2": int, "y2": int, "durationMs"?: int}
- scroll                     {"direction": "up"|"down"|"left"|"right"}
- dynamic_scroll             {"direction": ..., "targetText"?: string, "maxAttempts"?: int}
- type_text                  {"text": string, "clearFirst"?: bool}   (only after focusing a field)
- type_in_field              {"index": int, "text": string, "clearFirst"?: bool}
- type_in_ocr_field          {"label": string, "text": string, "clearFirst"?: bool}
- key_event                  {"code": int} or {"key": "enter"|"search"|"back"|"delete"|"tab"}
- open_app_by_name           {"appName": string}
- back                       {}
- home                       {}
- wait                       {"durationMs": int}

Reply format:
{"action": "<name>", "parameters": {...}, "description": "<what this step does>",
 "reasoning": "<why>", "isComplete": <true only when the task is fully done>}
When the task is already complete reply {"isComplete": true, "description": "<summary>"}."#;

pub struct PromptInput<'a> {
    pub task: &'a str,
    pub step_number: u32,
    pub history: &'a [TaskStep],
    pub history_window: usize,
    pub context: &'a ScreenContext,
}

pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let ctx = input.context;
    let mut out = String::new();

    let _ = writeln!(out, "TASK: {}", input.task);
    let _ = writeln!(out, "STEP: {}", input.step_number);
    let _ = writeln!(
        out,
        "CURRENT APP: {}{}",
        ctx.current_app.package_name,
        ctx.current_app
            .activity
            .as_deref()
            .map(|a| format!(" ({a})"))
            .unwrap_or_default()
    );
    if ctx.degraded {
        let _ = writeln!(out, "NOTE: screen inspection was partially unavailable.");
    }

    out.push_str("\nPREVIOUS STEPS:\n");
    out.push_str(&format_history(input.history, input.history_window));

    out.push_str("\nSCREEN ELEMENTS (index | role | text | flags | bounds):\n");
    if ctx.elements.is_empty() {
        out.push_str("(accessibility tree empty)\n");
    }
    for e in &ctx.elements {
        out.push_str(&format_element(e));
        out.push('\n');
    }

    if ctx.has_ocr() {
        out.push_str("\nOCR TEXT (from screenshot):\n");
        for block in &ctx.ocr_blocks {
            let _ = writeln!(out, "- \"{}\" at {}", block.text.trim(), block.bounds);
        }
        if ctx.ocr_blocks.is_empty() {
            let _ = writeln!(out, "{}", ctx.ocr_text.trim());
        }
    }

    if !ctx.system_dialogs.is_empty() {
        out.push_str("\nSYSTEM DIALOG ON SCREEN — handle it first:\n");
        for e in &ctx.system_dialogs {
            out.push_str(&format_element(e));
            out.push('\n');
        }
    }

    out.push('\n');
    out.push_str(ACTION_VOCABULARY);
    out
}

pub fn format_element(e: &Element) -> String {
    let mut flags = Vec::new();
    if e.clickable {
        flags.push("clickable");
    }
    if e.scrollable {
        flags.push("scrollable");
    }
    if e.editable {
        flags.push("editable");
    }
    let label = match (e.text.trim(), e.content_description.trim()) {
        ("", "") => String::new(),
        (t, "") => format!("\"{t}\""),
        ("", d) => format!("desc=\"{d}\""),
        (t, d) if t == d => format!("\"{t}\""),
        (t, d) => format!("\"{t}\" desc=\"{d}\""),
    };
    format!(
        "[{}] {} | {} | {} | {}",
        e.index,
        e.role(),
        label,
        flags.join(","),
        e.bounds
    )
}

/// Most recent `window` steps, oldest first.
pub fn format_history(history: &[TaskStep], window: usize) -> String {
    if history.is_empty() {
        return "(none)\n".into();
    }
    let skip = history.len().saturating_sub(window);
    let mut out = String::new();
    for step in &history[skip..] {
        let _ = writeln!(
            out,
            "{}. {} {} → {}{}",
            step.step_number,
            step.action,
            step.parameters,
            if step.success { "ok" } else { "FAILED" },
            if step.description.is_empty() {
                String::new()
            } else {
                format!(" — {}", step.description)
            }
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_engine::state::InteractionType;
    use crate::perception::types::Bounds;
    use crate::testing::{context_with, element};

    fn step(n: u32, action: &str, success: bool) -> TaskStep {
        TaskStep {
            step_number: n,
            action: action.into(),
            parameters: serde_json::json!({}),
            description: String::new(),
            success,
            timestamp: chrono::Utc::now(),
            interaction: InteractionType::Tap,
        }
    }

    #[test]
    fn prompt_lists_elements_and_vocabulary() {
        let mut sw = element("Wi-Fi", Bounds::new(0, 300, 1080, 400), true);
        sw.class_name = "android.widget.Switch".into();
        let ctx = context_with(vec![sw]);
        let prompt = build_prompt(&PromptInput {
            task: "enable wifi",
            step_number: 2,
            history: &[],
            history_window: 10,
            context: &ctx,
        });
        assert!(prompt.contains("TASK: enable wifi"));
        assert!(prompt.contains("STEP: 2"));
        assert!(prompt.contains("[0] Switch | \"Wi-Fi\" | clickable | [0,300][1080,400]"));
        assert!(prompt.contains("tap_element_by_index"));
        assert!(!prompt.contains("OCR TEXT"));
    }

    #[test]
    fn history_is_windowed() {
        let steps: Vec<_> = (1..=5).map(|n| step(n, "tap_element_by_index", n != 4)).collect();
        let text = format_history(&steps, 2);
        assert!(!text.contains("3. "));
        assert!(text.contains("4. tap_element_by_index {} → FAILED"));
        assert!(text.contains("5. tap_element_by_index {} → ok"));
    }
}
