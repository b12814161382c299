/// Target resolution: turns an oracle target (index, bounds or text) into a
/// tap point in device UI coordinates.
///
/// OCR blocks are boxed in the pixel space of the screenshot the OCR engine
/// saw, which is not necessarily the device's UI space (screenshots may be
/// downscaled, UI bounds may exclude system bars). When both the OCR image
/// size and an estimated screen extent are known, OCR coordinates are scaled
/// into UI space; otherwise they are used as-is.
use serde::Serialize;

use crate::config::ResolverConfig;
use crate::errors::{ClawError, ClawResult};
use crate::executor::fuzzy::{self, MatchWeights};
use crate::perception::types::{Bounds, Element, OcrBlock, ScreenContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Accessibility,
    Ocr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// Device UI coordinates, as reported by the accessibility tree.
    Screen,
    /// Pixel space of the OCR source image.
    OcrImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Index,
    Bounds,
    AccessibilityText,
    OcrText,
    OcrBounds,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedTarget {
    pub x: i32,
    pub y: i32,
    /// Target bounds in device UI coordinates.
    pub bounds: Bounds,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<Element>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub source: TargetSource,
}

pub struct TargetResolver {
    config: ResolverConfig,
}

impl TargetResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    fn weights(&self) -> MatchWeights {
        MatchWeights {
            token: self.config.token_weight,
            prefix: self.config.prefix_weight,
        }
    }

    fn from_element(&self, element: &Element, source: TargetSource) -> ResolvedTarget {
        let (x, y) = element.bounds.tap_point(self.config.tap_padding_px);
        ResolvedTarget {
            x,
            y,
            bounds: element.bounds,
            label: element.display_text().to_string(),
            element: Some(element.clone()),
            score: None,
            source,
        }
    }

    pub fn resolve_by_index(&self, ctx: &ScreenContext, index: usize) -> ClawResult<ResolvedTarget> {
        let element = ctx.element(index).ok_or_else(|| {
            ClawError::TargetNotFound(format!(
                "element index {index} out of range ({} elements on screen)",
                ctx.elements.len()
            ))
        })?;
        if element.bounds.is_empty() {
            return Err(ClawError::TargetNotFound(format!(
                "element {index} has empty bounds {}",
                element.bounds
            )));
        }
        Ok(self.from_element(element, TargetSource::Index))
    }

    pub fn resolve_by_bounds(
        &self,
        ctx: &ScreenContext,
        bounds: Bounds,
        space: CoordinateSpace,
    ) -> ClawResult<ResolvedTarget> {
        if bounds.is_empty() {
            return Err(ClawError::TargetNotFound(format!("empty bounds {bounds}")));
        }
        let tolerance = self.config.bounds_tolerance_px;
        match space {
            CoordinateSpace::Screen => {
                if let Some(element) = ctx
                    .elements
                    .iter()
                    .find(|e| e.bounds.approx_eq(&bounds, tolerance))
                {
                    return Ok(self.from_element(element, TargetSource::Bounds));
                }
                tracing::debug!(%bounds, "no element matches bounds — tapping raw bounds");
                let (x, y) = bounds.tap_point(self.config.tap_padding_px);
                Ok(ResolvedTarget {
                    x,
                    y,
                    bounds,
                    label: String::new(),
                    element: None,
                    score: None,
                    source: TargetSource::Bounds,
                })
            }
            CoordinateSpace::OcrImage => {
                let label = ctx
                    .ocr_blocks
                    .iter()
                    .find(|b| b.bounds.approx_eq(&bounds, tolerance))
                    .map(|b| b.text.clone())
                    .unwrap_or_default();
                let screen = ocr_to_screen(ctx, bounds);
                let (x, y) = screen.tap_point(self.config.tap_padding_px);
                Ok(ResolvedTarget {
                    x,
                    y,
                    bounds: screen,
                    label,
                    element: None,
                    score: None,
                    source: TargetSource::OcrBounds,
                })
            }
        }
    }

    pub fn resolve_by_text(
        &self,
        ctx: &ScreenContext,
        text: &str,
        source: TextSource,
    ) -> ClawResult<ResolvedTarget> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return Err(ClawError::TargetNotFound("empty target text".into()));
        }
        match source {
            TextSource::Accessibility => ctx
                .elements
                .iter()
                .find(|e| {
                    !e.bounds.is_empty()
                        && (e.text.to_lowercase().contains(&needle)
                            || e.content_description.to_lowercase().contains(&needle))
                })
                .map(|e| self.from_element(e, TargetSource::AccessibilityText))
                .ok_or_else(|| {
                    ClawError::TargetNotFound(format!("no accessibility element contains \"{text}\""))
                }),
            TextSource::Ocr => {
                let (block, score) = self.best_ocr_block(ctx, text).ok_or_else(|| {
                    ClawError::TargetNotFound(format!("no OCR text on screen to match \"{text}\""))
                })?;
                if score < self.config.min_ocr_score {
                    return Err(ClawError::TargetNotFound(format!(
                        "best OCR match \"{}\" for \"{text}\" scored {score:.2} (< {:.2})",
                        block.text, self.config.min_ocr_score
                    )));
                }
                let screen = ocr_to_screen(ctx, block.bounds);
                let (x, y) = screen.tap_point(self.config.tap_padding_px);
                tracing::debug!(target = %text, matched = %block.text, score, x, y, "OCR text resolved");
                Ok(ResolvedTarget {
                    x,
                    y,
                    bounds: screen,
                    label: block.text.clone(),
                    element: None,
                    score: Some(score),
                    source: TargetSource::OcrText,
                })
            }
        }
    }

    /// Highest-scoring OCR block for `target`; ties keep the earliest block.
    pub fn best_ocr_block<'a>(&self, ctx: &'a ScreenContext, target: &str) -> Option<(&'a OcrBlock, f64)> {
        let weights = self.weights();
        ctx.ocr_blocks
            .iter()
            .map(|b| (b, fuzzy::score_with(&b.text, target, weights)))
            .fold(None, |best: Option<(&OcrBlock, f64)>, (b, s)| match best {
                Some((_, bs)) if bs >= s => best,
                _ => Some((b, s)),
            })
    }
}

/// Scale factors from OCR-image pixels to device UI coordinates, if both
/// extents are known.
pub fn ocr_scale(ctx: &ScreenContext) -> Option<(f64, f64)> {
    let (ocr_w, ocr_h) = ctx.ocr_image_size?;
    let (screen_w, screen_h) = ctx.estimated_screen_extent()?;
    if ocr_w == 0 || ocr_h == 0 {
        return None;
    }
    Some((screen_w as f64 / ocr_w as f64, screen_h as f64 / ocr_h as f64))
}

pub fn ocr_to_screen(ctx: &ScreenContext, bounds: Bounds) -> Bounds {
    match ocr_scale(ctx) {
        Some((sx, sy)) => bounds.scaled(sx, sy),
        None => bounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context_with, element};

    fn resolver() -> TargetResolver {
        TargetResolver::new(ResolverConfig::default())
    }

    #[test]
    fn index_resolves_to_bounds_center() {
        let ctx = context_with(vec![
            element("Network", Bounds::new(0, 0, 400, 100), true),
            element("Wi-Fi", Bounds::new(0, 100, 400, 200), true),
        ]);
        let t = resolver().resolve_by_index(&ctx, 1).unwrap();
        assert_eq!((t.x, t.y), (200, 150));
        assert_eq!(t.label, "Wi-Fi");
        assert!(matches!(
            resolver().resolve_by_index(&ctx, 7),
            Err(ClawError::TargetNotFound(_))
        ));
    }

    #[test]
    fn bounds_match_within_tolerance() {
        let ctx = context_with(vec![element("OK", Bounds::new(100, 100, 300, 200), true)]);
        let t = resolver()
            .resolve_by_bounds(&ctx, Bounds::new(103, 97, 304, 200), CoordinateSpace::Screen)
            .unwrap();
        assert_eq!(t.label, "OK");
        assert_eq!(t.bounds, Bounds::new(100, 100, 300, 200));

        let raw = resolver()
            .resolve_by_bounds(&ctx, Bounds::new(500, 500, 600, 600), CoordinateSpace::Screen)
            .unwrap();
        assert!(raw.element.is_none());
        assert_eq!((raw.x, raw.y), (550, 550));
    }

    #[test]
    fn accessibility_text_is_first_substring_match() {
        let mut label_only = element("", Bounds::new(0, 0, 100, 100), true);
        label_only.content_description = "Search settings".into();
        let ctx = context_with(vec![
            label_only,
            element("Search", Bounds::new(0, 100, 100, 200), true),
        ]);
        let t = resolver()
            .resolve_by_text(&ctx, "SEARCH", TextSource::Accessibility)
            .unwrap();
        assert_eq!(t.element.unwrap().index, 0);
    }

    #[test]
    fn ocr_block_is_scaled_into_screen_space() {
        let mut ctx = context_with(vec![element("root", Bounds::new(0, 0, 400, 400), false)]);
        ctx.ocr_image_size = Some((200, 200));
        ctx.ocr_blocks = vec![OcrBlock {
            text: "Search".into(),
            bounds: Bounds::new(90, 90, 110, 110),
        }];
        let t = resolver().resolve_by_text(&ctx, "search", TextSource::Ocr).unwrap();
        assert_eq!((t.x, t.y), (200, 200));
    }

    #[test]
    fn ocr_without_extent_uses_raw_coordinates() {
        let mut ctx = context_with(Vec::new());
        ctx.ocr_image_size = Some((200, 200));
        ctx.ocr_blocks = vec![OcrBlock {
            text: "Play now".into(),
            bounds: Bounds::new(90, 90, 110, 110),
        }];
        let t = resolver().resolve_by_text(&ctx, "play", TextSource::Ocr).unwrap();
        assert_eq!((t.x, t.y), (100, 100));
    }

    #[test]
    fn weak_ocr_match_is_rejected() {
        let mut ctx = context_with(Vec::new());
        ctx.ocr_blocks = vec![OcrBlock {
            text: "unrelated label".into(),
            bounds: Bounds::new(0, 0, 10, 10),
        }];
        assert!(matches!(
            resolver().resolve_by_text(&ctx, "search", TextSource::Ocr),
            Err(ClawError::TargetNotFound(_))
        ));
    }

    #[test]
    fn best_block_prefers_higher_score() {
        let mut ctx = context_with(Vec::new());
        ctx.ocr_blocks = vec![
            OcrBlock {
                text: "Searching nearby".into(),
                bounds: Bounds::new(0, 0, 10, 10),
            },
            OcrBlock {
                text: "Search bar".into(),
                bounds: Bounds::new(0, 20, 10, 30),
            },
        ];
        let (block, _) = resolver().best_ocr_block(&ctx, "search").unwrap();
        assert_eq!(block.text, "Search bar");
    }
}
