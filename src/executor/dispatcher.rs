// Executes a validated oracle decision against the device.
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::state::InteractionType;
use crate::config::{ResolverConfig, ScrollerConfig};
use crate::errors::{ClawError, ClawResult};
use crate::executor::input::{keycode, ActionExecutor};
use crate::executor::resolver::{CoordinateSpace, ResolvedTarget, TargetResolver, TextSource};
use crate::executor::scroller::{DynamicScroller, ScrollRequest};
use crate::executor::text_input::{ProcessedFieldSet, TextEntry};
use crate::llm::decision::DecisionAction;
use crate::perception::context::ContextBuilder;
use crate::perception::types::ScreenContext;

/// What an executed action did, for the step log.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub interaction: InteractionType,
    pub message: String,
}

impl Dispatched {
    fn new(interaction: InteractionType, message: impl Into<String>) -> Self {
        Self {
            interaction,
            message: message.into(),
        }
    }
}

pub struct ActionDispatcher {
    executor: Arc<dyn ActionExecutor>,
    contexts: Arc<ContextBuilder>,
    resolver: TargetResolver,
    scroller: DynamicScroller,
    scroll_defaults: ScrollerConfig,
    type_delay_ms: u64,
}

impl ActionDispatcher {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        contexts: Arc<ContextBuilder>,
        resolver_config: ResolverConfig,
        scroll_defaults: ScrollerConfig,
        type_delay_ms: u64,
    ) -> Self {
        Self {
            scroller: DynamicScroller::new(contexts.clone(), executor.clone()),
            resolver: TargetResolver::new(resolver_config),
            executor,
            contexts,
            scroll_defaults,
            type_delay_ms,
        }
    }

    fn text_entry(&self) -> TextEntry<'_> {
        TextEntry {
            executor: self.executor.as_ref(),
            contexts: self.contexts.as_ref(),
            resolver: &self.resolver,
            delay_ms: self.type_delay_ms,
        }
    }

    /// Run `action` against `ctx`, the context the decision was made on.
    ///
    /// Errors: `TargetNotFound` when the target cannot be located (the loop
    /// keeps going), `Executor` when the platform rejects the action.
    pub async fn dispatch(
        &self,
        action: &DecisionAction,
        ctx: &ScreenContext,
        fields: &mut ProcessedFieldSet,
    ) -> ClawResult<Dispatched> {
        match action {
            DecisionAction::TapElementByIndex { index } => {
                let target = self.resolver.resolve_by_index(ctx, *index)?;
                self.tap_target(&target, fields).await
            }
            DecisionAction::TapElementByText { text } => {
                let target = match self.resolver.resolve_by_text(ctx, text, TextSource::Accessibility) {
                    Ok(t) => t,
                    Err(ClawError::TargetNotFound(_)) if ctx.has_ocr() => {
                        tracing::debug!(target = %text, "not in accessibility tree — trying OCR");
                        self.resolver.resolve_by_text(ctx, text, TextSource::Ocr)?
                    }
                    Err(e) => return Err(e),
                };
                self.tap_target(&target, fields).await
            }
            DecisionAction::TapElementByBounds { bounds } => {
                let target = self
                    .resolver
                    .resolve_by_bounds(ctx, *bounds, CoordinateSpace::Screen)?;
                self.tap_target(&target, fields).await
            }
            DecisionAction::OcrTapByText { text } => {
                let ocr_ctx = self.ensure_ocr(ctx).await;
                let target = self.resolver.resolve_by_text(&ocr_ctx, text, TextSource::Ocr)?;
                self.tap_target(&target, fields).await
            }
            DecisionAction::OcrTapByBounds { bounds } => {
                let ocr_ctx = self.ensure_ocr(ctx).await;
                let target = self
                    .resolver
                    .resolve_by_bounds(&ocr_ctx, *bounds, CoordinateSpace::OcrImage)?;
                self.tap_target(&target, fields).await
            }
            DecisionAction::LongPressElementByIndex { index, duration_ms } => {
                let target = self.resolver.resolve_by_index(ctx, *index)?;
                self.executor
                    .long_press(target.x, target.y, *duration_ms)
                    .await
                    .map_err(executor_error)?;
                Ok(Dispatched::new(
                    InteractionType::LongPress,
                    format!("Long-pressed \"{}\" at ({},{})", target.label, target.x, target.y),
                ))
            }
            DecisionAction::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => {
                self.executor
                    .swipe(*x1, *y1, *x2, *y2, *duration_ms)
                    .await
                    .map_err(executor_error)?;
                Ok(Dispatched::new(
                    InteractionType::Swipe,
                    format!("Swiped ({x1},{y1}) → ({x2},{y2})"),
                ))
            }
            DecisionAction::Scroll { direction } => {
                self.executor.scroll(*direction).await.map_err(executor_error)?;
                Ok(Dispatched::new(
                    InteractionType::Scroll,
                    format!("Scrolled {direction}"),
                ))
            }
            DecisionAction::DynamicScroll {
                direction,
                target_text,
                max_attempts,
            } => {
                let request = ScrollRequest {
                    direction: *direction,
                    target_text: target_text.clone(),
                    max_attempts: max_attempts.unwrap_or(self.scroll_defaults.max_attempts),
                    identical_threshold: self.scroll_defaults.identical_threshold,
                    wait: Duration::from_millis(self.scroll_defaults.wait_ms),
                    fuzzy_word_ratio: self.scroll_defaults.fuzzy_word_ratio,
                };
                let outcome = self.scroller.scroll(&request).await.map_err(executor_error)?;
                match target_text {
                    Some(t) if !outcome.found => Err(ClawError::TargetNotFound(format!(
                        "\"{t}\" not found after {} scrolls{}",
                        outcome.attempts,
                        if outcome.reversed { " in both directions" } else { "" }
                    ))),
                    Some(t) => Ok(Dispatched::new(
                        InteractionType::Scroll,
                        format!("Scrolled {} times; \"{t}\" is visible", outcome.attempts),
                    )),
                    None => Ok(Dispatched::new(
                        InteractionType::Scroll,
                        format!(
                            "Scrolled {direction} {} times{}",
                            outcome.attempts,
                            if outcome.reached_end { " to the end" } else { "" }
                        ),
                    )),
                }
            }
            DecisionAction::TypeText { text, clear_first } => {
                let retried = self.text_entry().type_with_refocus(text, *clear_first, None).await?;
                Ok(Dispatched::new(
                    InteractionType::Type,
                    typed_message(text, retried),
                ))
            }
            DecisionAction::TypeInField {
                index,
                text,
                clear_first,
            } => {
                let target = self.resolver.resolve_by_index(ctx, *index)?;
                let key = target
                    .element
                    .as_ref()
                    .map(|e| e.field_key())
                    .unwrap_or_else(|| target.bounds.to_string());
                if !fields.contains(&key) {
                    self.executor.tap(target.x, target.y).await.map_err(executor_error)?;
                    fields.insert(key);
                    tokio::time::sleep(Duration::from_millis(150)).await;
                }
                let hint = (!target.label.is_empty()).then_some(target.label.as_str());
                let retried = self.text_entry().type_with_refocus(text, *clear_first, hint).await?;
                Ok(Dispatched::new(
                    InteractionType::Type,
                    typed_message(text, retried),
                ))
            }
            DecisionAction::TypeInOcrField {
                label,
                text,
                clear_first,
            } => {
                let ocr_ctx = self.ensure_ocr(ctx).await;
                let target = self.resolver.resolve_by_text(&ocr_ctx, label, TextSource::Ocr)?;
                self.executor.tap(target.x, target.y).await.map_err(executor_error)?;
                fields.insert(format!("ocr:{}", target.label));
                tokio::time::sleep(Duration::from_millis(150)).await;
                let retried = self
                    .text_entry()
                    .type_with_refocus(text, *clear_first, Some(label))
                    .await?;
                Ok(Dispatched::new(
                    InteractionType::Type,
                    typed_message(text, retried),
                ))
            }
            DecisionAction::KeyEvent { code } => {
                self.executor.key_event(*code).await.map_err(executor_error)?;
                let interaction = if *code == keycode::SEARCH {
                    InteractionType::SearchInitiation
                } else {
                    InteractionType::KeyEvent
                };
                Ok(Dispatched::new(interaction, format!("Sent key {code}")))
            }
            DecisionAction::OpenAppByName { app_name } => {
                self.executor
                    .open_app_by_name(app_name)
                    .await
                    .map_err(executor_error)?;
                fields.clear();
                Ok(Dispatched::new(
                    InteractionType::AppLaunch,
                    format!("Opened {app_name}"),
                ))
            }
            DecisionAction::Back => {
                self.executor.back().await.map_err(executor_error)?;
                Ok(Dispatched::new(InteractionType::Navigation, "Pressed back"))
            }
            DecisionAction::Home => {
                self.executor.home().await.map_err(executor_error)?;
                Ok(Dispatched::new(InteractionType::Navigation, "Pressed home"))
            }
            DecisionAction::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                Ok(Dispatched::new(
                    InteractionType::Wait,
                    format!("Waited {duration_ms}ms"),
                ))
            }
            DecisionAction::Finish => Ok(Dispatched::new(InteractionType::None, "Task complete")),
            DecisionAction::Unrecognized { name, detail } => Err(ClawError::SequenceViolation(
                format!("action `{name}` cannot be executed: {detail}"),
            )),
        }
    }

    async fn tap_target(
        &self,
        target: &ResolvedTarget,
        fields: &mut ProcessedFieldSet,
    ) -> ClawResult<Dispatched> {
        tracing::info!(
            label = %target.label,
            x = target.x,
            y = target.y,
            source = ?target.source,
            "tap"
        );
        self.executor.tap(target.x, target.y).await.map_err(executor_error)?;

        let interaction = classify_tap(target);
        if interaction == InteractionType::InputFocus {
            if let Some(e) = &target.element {
                fields.insert(e.field_key());
            }
        }
        Ok(Dispatched::new(
            interaction,
            format!("Tapped \"{}\" at ({},{})", target.label, target.x, target.y),
        ))
    }

    /// The given context if it carries OCR output, otherwise a fresh capture with OCR.
    async fn ensure_ocr(&self, ctx: &ScreenContext) -> Arc<ScreenContext> {
        if ctx.has_ocr() {
            Arc::new(ctx.clone())
        } else {
            tracing::debug!("OCR action on a context without OCR — recapturing with OCR");
            self.contexts.capture_with_ocr().await
        }
    }
}

fn classify_tap(target: &ResolvedTarget) -> InteractionType {
    let mentions_search = |s: &str| s.to_lowercase().contains("search");
    if let Some(e) = &target.element {
        if e.editable {
            return InteractionType::InputFocus;
        }
        if mentions_search(&e.text)
            || mentions_search(&e.content_description)
            || e.view_id.as_deref().is_some_and(mentions_search)
        {
            return InteractionType::SearchInitiation;
        }
        return InteractionType::Tap;
    }
    if mentions_search(&target.label) {
        InteractionType::SearchInitiation
    } else {
        InteractionType::Tap
    }
}

fn typed_message(text: &str, retried: bool) -> String {
    if retried {
        format!("Typed \"{text}\" (after refocus)")
    } else {
        format!("Typed \"{text}\"")
    }
}

fn executor_error(e: ClawError) -> ClawError {
    match e {
        ClawError::Executor(_) => e,
        other => ClawError::Executor(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextConfig;
    use crate::executor::input::ScrollDirection;
    use crate::perception::types::{Bounds, OcrBlock};
    use crate::testing::{context_with, element, MockExecutor, MockInspector};

    fn dispatcher(inspector: Arc<MockInspector>, executor: Arc<MockExecutor>) -> ActionDispatcher {
        let contexts = Arc::new(ContextBuilder::new(inspector, ContextConfig::default()));
        let scroll = ScrollerConfig {
            wait_ms: 1,
            ..ScrollerConfig::default()
        };
        ActionDispatcher::new(executor, contexts, ResolverConfig::default(), scroll, 0)
    }

    #[tokio::test]
    async fn tapping_an_editable_element_focuses_it() {
        let executor = Arc::new(MockExecutor::new());
        let d = dispatcher(Arc::new(MockInspector::new("com.example")), executor.clone());
        let mut field = element("Search settings", Bounds::new(0, 0, 1000, 100), true);
        field.editable = true;
        field.view_id = Some("search_src_text".into());
        let ctx = context_with(vec![field]);
        let mut fields = ProcessedFieldSet::new();
        let out = d
            .dispatch(&DecisionAction::TapElementByIndex { index: 0 }, &ctx, &mut fields)
            .await
            .unwrap();
        assert_eq!(out.interaction, InteractionType::InputFocus);
        assert!(fields.contains("search_src_text"));
        assert_eq!(executor.calls(), vec!["tap 500,50"]);
    }

    #[tokio::test]
    async fn type_in_field_taps_only_once_per_screen() {
        let executor = Arc::new(MockExecutor::new());
        let d = dispatcher(Arc::new(MockInspector::new("com.example")), executor.clone());
        let mut field = element("", Bounds::new(0, 0, 1000, 100), true);
        field.editable = true;
        field.view_id = Some("query".into());
        let ctx = context_with(vec![field]);
        let mut fields = ProcessedFieldSet::new();
        let action = DecisionAction::TypeInField {
            index: 0,
            text: "wifi".into(),
            clear_first: true,
        };
        d.dispatch(&action, &ctx, &mut fields).await.unwrap();
        d.dispatch(&action, &ctx, &mut fields).await.unwrap();
        assert_eq!(executor.calls(), vec!["tap 500,50", "type wifi", "type wifi"]);
    }

    #[tokio::test]
    async fn text_tap_falls_back_to_ocr() {
        let executor = Arc::new(MockExecutor::new());
        let d = dispatcher(Arc::new(MockInspector::new("com.example")), executor.clone());
        let mut ctx = context_with(vec![element("Header", Bounds::new(0, 0, 400, 400), false)]);
        ctx.ocr_image_size = Some((200, 200));
        ctx.ocr_text = "Accept cookies".into();
        ctx.ocr_blocks = vec![OcrBlock {
            text: "Accept cookies".into(),
            bounds: Bounds::new(40, 90, 160, 110),
        }];
        let mut fields = ProcessedFieldSet::new();
        d.dispatch(
            &DecisionAction::TapElementByText {
                text: "accept".into(),
            },
            &ctx,
            &mut fields,
        )
        .await
        .unwrap();
        assert_eq!(executor.calls(), vec!["tap 200,200"]);
    }

    #[tokio::test]
    async fn missing_target_is_not_an_executor_error() {
        let executor = Arc::new(MockExecutor::new());
        let d = dispatcher(Arc::new(MockInspector::new("com.example")), executor.clone());
        let ctx = context_with(Vec::new());
        let mut fields = ProcessedFieldSet::new();
        let err = d
            .dispatch(&DecisionAction::TapElementByIndex { index: 4 }, &ctx, &mut fields)
            .await
            .unwrap_err();
        assert!(matches!(err, ClawError::TargetNotFound(_)));
        assert!(!err.is_terminal());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_gesture_is_terminal() {
        let executor = Arc::new(MockExecutor::new());
        executor.fail_all(true);
        let d = dispatcher(Arc::new(MockInspector::new("com.example")), executor);
        let ctx = context_with(Vec::new());
        let mut fields = ProcessedFieldSet::new();
        let err = d
            .dispatch(
                &DecisionAction::Scroll {
                    direction: ScrollDirection::Down,
                },
                &ctx,
                &mut fields,
            )
            .await
            .unwrap_err();
        assert!(err.is_terminal());
    }
}
