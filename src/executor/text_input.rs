// Text entry with focus tracking and a single OCR-refocus retry.
use std::collections::HashSet;

use crate::errors::{ClawError, ClawResult};
use crate::executor::input::ActionExecutor;
use crate::executor::resolver::{TargetResolver, TextSource};
use crate::perception::context::ContextBuilder;
use crate::perception::types::AppInfo;

/// Fields already tapped for focus on the current screen.
#[derive(Debug, Default)]
pub struct ProcessedFieldSet {
    fields: HashSet<String>,
    screen: Option<AppInfo>,
}

impl ProcessedFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.screen = None;
    }

    /// Forget all fields when the foreground app or activity changed.
    pub fn observe_screen(&mut self, app: &AppInfo) {
        if self.screen.as_ref() != Some(app) {
            if !self.fields.is_empty() {
                tracing::debug!(app = %app.package_name, "screen changed — clearing focused fields");
            }
            self.fields.clear();
            self.screen = Some(app.clone());
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains(key)
    }

    pub fn insert(&mut self, key: String) -> bool {
        self.fields.insert(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub struct TextEntry<'a> {
    pub executor: &'a dyn ActionExecutor,
    pub contexts: &'a ContextBuilder,
    pub resolver: &'a TargetResolver,
    pub delay_ms: u64,
}

impl TextEntry<'_> {
    /// Type `text`; on executor failure refocus the input (OCR-assisted) and
    /// retry exactly once. Returns whether the retry was needed.
    pub async fn type_with_refocus(
        &self,
        text: &str,
        clear_first: bool,
        hint: Option<&str>,
    ) -> ClawResult<bool> {
        let first = match self.executor.type_text(text, clear_first, self.delay_ms).await {
            Ok(()) => return Ok(false),
            Err(e) => e,
        };
        tracing::warn!(error = %first, "typing failed — refocusing input before one retry");

        if !self.refocus(hint).await? {
            return Err(ClawError::Executor(format!(
                "typing failed and no input field could be refocused: {first}"
            )));
        }

        self.executor
            .type_text(text, clear_first, self.delay_ms)
            .await
            .map_err(|e| ClawError::Executor(format!("typing failed after refocus: {e}")))?;
        Ok(true)
    }

    async fn refocus(&self, hint: Option<&str>) -> ClawResult<bool> {
        let ctx = self.contexts.capture_with_ocr().await;

        let target = hint
            .and_then(|h| self.resolver.resolve_by_text(&ctx, h, TextSource::Ocr).ok())
            .map(|t| (t.x, t.y))
            .or_else(|| {
                ctx.elements
                    .iter()
                    .find(|e| e.editable && !e.bounds.is_empty())
                    .map(|e| e.bounds.center())
            })
            .or_else(|| {
                self.resolver
                    .resolve_by_text(&ctx, "search", TextSource::Ocr)
                    .ok()
                    .map(|t| (t.x, t.y))
            });

        match target {
            Some((x, y)) => {
                tracing::info!(x, y, "refocusing input");
                self.executor.tap(x, y).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
