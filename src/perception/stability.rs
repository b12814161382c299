/// Change detection between screen contexts.
///
/// Two flavours are used by the agent:
/// - a textual snapshot with a repeat counter, which the scroller uses to
///   notice that scrolling no longer moves the content;
/// - a shallow fingerprint that lets the loop skip an oracle call when the
///   screen has not changed since the last decision.
use std::time::{Duration, Instant};

use crate::perception::types::ScreenContext;

/// Newline-joined `text|label` per element, followed by the OCR text.
pub fn scroll_snapshot(ctx: &ScreenContext) -> String {
    let mut out = String::new();
    for e in &ctx.elements {
        out.push_str(e.text.trim());
        out.push('|');
        out.push_str(e.content_description.trim());
        out.push('\n');
    }
    out.push_str(ctx.ocr_text.trim());
    out
}

/// Counts how many times in a row the same snapshot was observed.
#[derive(Debug, Default)]
pub struct SnapshotRepeatCounter {
    last: Option<String>,
    repeats: u32,
}

impl SnapshotRepeatCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.repeats = 0;
    }

    /// Record `snapshot` and return the current run of identical observations
    /// (0 when it differs from the previous one).
    pub fn observe(&mut self, snapshot: String) -> u32 {
        if self.last.as_deref() == Some(snapshot.as_str()) {
            self.repeats += 1;
        } else {
            self.repeats = 0;
            self.last = Some(snapshot);
        }
        self.repeats
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFingerprint {
    package_name: String,
    activity: Option<String>,
    head: Vec<String>,
    ocr_text: String,
}

impl ContextFingerprint {
    /// Fingerprint over the first `depth` elements, the OCR text and the foreground app.
    pub fn of(ctx: &ScreenContext, depth: usize) -> Self {
        let head = ctx
            .elements
            .iter()
            .take(depth)
            .map(|e| {
                format!(
                    "{}|{}|{}|{}",
                    e.text.trim(),
                    e.content_description.trim(),
                    e.class_name,
                    e.bounds
                )
            })
            .collect();
        Self {
            package_name: ctx.current_app.package_name.clone(),
            activity: ctx.current_app.activity.clone(),
            head,
            ocr_text: ctx.ocr_text.trim().to_string(),
        }
    }
}

#[derive(Debug)]
pub struct StabilityTracker {
    depth: usize,
    window: Duration,
    reference: Option<(ContextFingerprint, Instant)>,
}

impl StabilityTracker {
    pub fn new(depth: usize, window: Duration) -> Self {
        Self {
            depth,
            window,
            reference: None,
        }
    }

    pub fn reset(&mut self) {
        self.reference = None;
    }

    /// True when `ctx` matches the last decided-upon context and the window
    /// since that decision has not elapsed yet.
    pub fn is_unchanged(&self, ctx: &ScreenContext, now: Instant) -> bool {
        match &self.reference {
            Some((fp, at)) => {
                now.saturating_duration_since(*at) < self.window
                    && *fp == ContextFingerprint::of(ctx, self.depth)
            }
            None => false,
        }
    }

    /// Mark `ctx` as the context the next decision is based on.
    pub fn record(&mut self, ctx: &ScreenContext, now: Instant) {
        self.reference = Some((ContextFingerprint::of(ctx, self.depth), now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::{AppInfo, Bounds, Element};

    fn ctx_with(texts: &[&str], ocr: &str) -> ScreenContext {
        let mut ctx = ScreenContext::degraded(AppInfo {
            package_name: "com.example".into(),
            activity: None,
        });
        ctx.degraded = false;
        ctx.elements = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Element {
                index: i,
                text: t.to_string(),
                bounds: Bounds::new(0, i as i32 * 100, 100, i as i32 * 100 + 90),
                ..Default::default()
            })
            .collect();
        ctx.ocr_text = ocr.into();
        ctx
    }

    #[test]
    fn snapshot_joins_elements_and_ocr() {
        let ctx = ctx_with(&["A", "B"], "ocr line");
        assert_eq!(scroll_snapshot(&ctx), "A|\nB|\nocr line");
    }

    #[test]
    fn repeat_counter_resets_on_change() {
        let mut c = SnapshotRepeatCounter::new();
        assert_eq!(c.observe("x".into()), 0);
        assert_eq!(c.observe("x".into()), 1);
        assert_eq!(c.observe("x".into()), 2);
        assert_eq!(c.observe("y".into()), 0);
    }

    #[test]
    fn fingerprint_ignores_elements_past_depth() {
        let a = ctx_with(&["1", "2", "3", "4", "5", "six"], "");
        let b = ctx_with(&["1", "2", "3", "4", "5", "seven"], "");
        assert_eq!(ContextFingerprint::of(&a, 5), ContextFingerprint::of(&b, 5));
        assert_ne!(ContextFingerprint::of(&a, 6), ContextFingerprint::of(&b, 6));
    }

    #[test]
    fn tracker_expires_after_window() {
        let ctx = ctx_with(&["Wi-Fi"], "");
        let mut t = StabilityTracker::new(5, Duration::from_secs(3));
        let start = Instant::now();
        assert!(!t.is_unchanged(&ctx, start));
        t.record(&ctx, start);
        assert!(t.is_unchanged(&ctx, start + Duration::from_secs(1)));
        assert!(!t.is_unchanged(&ctx, start + Duration::from_secs(4)));
        let other = ctx_with(&["Bluetooth"], "");
        assert!(!t.is_unchanged(&other, start + Duration::from_secs(1)));
    }
}
