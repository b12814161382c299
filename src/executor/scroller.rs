/// Dynamic scroll search.
///
/// Scrolls one direction until the target text shows up, the content stops
/// moving, or the attempt budget runs out. When the content stops moving the
/// direction is reversed once and the search continues with what is left of
/// the budget. Every iteration performs at most one executor scroll, so the
/// search ends after `max_attempts` scrolls at the latest.
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ClawResult;
use crate::executor::fuzzy;
use crate::executor::input::{ActionExecutor, ScrollDirection};
use crate::perception::context::ContextBuilder;
use crate::perception::stability::{scroll_snapshot, SnapshotRepeatCounter};
use crate::perception::types::ScreenContext;

#[derive(Debug, Clone)]
pub struct ScrollRequest {
    pub direction: ScrollDirection,
    /// Without a target the search stops at end of content and never reverses.
    pub target_text: Option<String>,
    pub max_attempts: u32,
    pub identical_threshold: u32,
    pub wait: Duration,
    pub fuzzy_word_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct ScrollOutcome {
    pub found: bool,
    /// Executor scrolls performed.
    pub attempts: u32,
    pub reversed: bool,
    pub reached_end: bool,
    /// Last context captured during the search.
    pub context: Arc<ScreenContext>,
}

pub struct DynamicScroller {
    contexts: Arc<ContextBuilder>,
    executor: Arc<dyn ActionExecutor>,
}

impl DynamicScroller {
    pub fn new(contexts: Arc<ContextBuilder>, executor: Arc<dyn ActionExecutor>) -> Self {
        Self { contexts, executor }
    }

    pub async fn scroll(&self, req: &ScrollRequest) -> ClawResult<ScrollOutcome> {
        let target = req.target_text.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let threshold = req.identical_threshold.max(1);

        let mut ctx = self.contexts.capture().await;
        if let Some(t) = target {
            if ctx.contains_text(t) {
                tracing::debug!(target = %t, "scroll target already visible");
                return Ok(ScrollOutcome {
                    found: true,
                    attempts: 0,
                    reversed: false,
                    reached_end: false,
                    context: ctx,
                });
            }
        }

        let mut direction = req.direction;
        let mut reversed = false;
        let mut attempts = 0;
        let mut repeats = SnapshotRepeatCounter::new();

        while attempts < req.max_attempts {
            if repeats.observe(scroll_snapshot(&ctx)) >= threshold {
                if target.is_none() || reversed {
                    tracing::info!(%direction, attempts, "scroll exhausted");
                    return Ok(ScrollOutcome {
                        found: false,
                        attempts,
                        reversed,
                        reached_end: true,
                        context: ctx,
                    });
                }
                direction = direction.reversed();
                reversed = true;
                repeats.reset();
                repeats.observe(scroll_snapshot(&ctx));
                tracing::info!(%direction, attempts, "end of content — reversing scroll direction");
            }

            self.executor.scroll(direction).await?;
            attempts += 1;
            tokio::time::sleep(req.wait).await;
            ctx = self.contexts.capture().await;

            if let Some(t) = target {
                if target_found(&ctx, t, req.fuzzy_word_ratio) {
                    tracing::info!(target = %t, attempts, reversed, "scroll target found");
                    return Ok(ScrollOutcome {
                        found: true,
                        attempts,
                        reversed,
                        reached_end: false,
                        context: ctx,
                    });
                }
            }
        }

        tracing::info!(attempts, reversed, "scroll budget exhausted");
        Ok(ScrollOutcome {
            found: false,
            attempts,
            reversed,
            reached_end: false,
            context: ctx,
        })
    }
}

fn target_found(ctx: &ScreenContext, target: &str, word_ratio: f64) -> bool {
    ctx.contains_text(target)
        || (!ctx.ocr_text.is_empty() && fuzzy::words_present(target, &ctx.ocr_text, word_ratio))
}
