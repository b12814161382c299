/// Screen context builder: merges the accessibility tree and OCR into a
/// single `ScreenContext` per loop iteration.
///
/// 1. Fetch the foreground app and the accessibility tree.
/// 2. Normalize the tree: drop unlabeled non-interactive nodes, remove
///    duplicates, reassign indices in list order.
/// 3. If the tree is empty or contains an opaque surface (web view, canvas…),
///    take a screenshot and run OCR over it.
/// 4. Collect system dialogs.
///
/// Inspector failures never propagate: they mark the context as degraded.
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use crate::config::ContextConfig;
use crate::perception::traits::ScreenInspector;
use crate::perception::types::{AppInfo, Element, OcrResult, ScreenContext};

pub struct ContextBuilder {
    inspector: Arc<dyn ScreenInspector>,
    config: ContextConfig,
    latest: Mutex<Option<Arc<ScreenContext>>>,
}

impl ContextBuilder {
    pub fn new(inspector: Arc<dyn ScreenInspector>, config: ContextConfig) -> Self {
        Self {
            inspector,
            config,
            latest: Mutex::new(None),
        }
    }

    pub async fn capture(&self) -> Arc<ScreenContext> {
        self.build(false).await
    }

    /// Capture with OCR regardless of what the tree looks like.
    pub async fn capture_with_ocr(&self) -> Arc<ScreenContext> {
        self.build(true).await
    }

    /// Most recent context produced by this builder.
    pub fn latest(&self) -> Option<Arc<ScreenContext>> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }

    async fn build(&self, force_ocr: bool) -> Arc<ScreenContext> {
        let mut degraded = false;

        let current_app = match self.inspector.current_app().await {
            Ok(app) => app,
            Err(e) => {
                tracing::warn!(error = %e, "current app lookup failed — continuing with unknown app");
                degraded = true;
                AppInfo::unknown()
            }
        };

        let raw = match self.inspector.accessibility_tree().await {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!(error = %e, "accessibility tree unavailable — relying on OCR");
                degraded = true;
                Vec::new()
            }
        };

        let opaque = looks_opaque(&raw, &self.config.opaque_class_hints);
        let elements = normalize_elements(raw);
        let tree_empty = elements.is_empty();

        let mut ctx = ScreenContext::degraded(current_app);
        ctx.degraded = degraded;
        ctx.system_dialogs =
            detect_system_dialogs(&ctx.current_app, &elements, &self.config.system_dialog_packages);
        ctx.elements = elements;

        if tree_empty || opaque || force_ocr {
            tracing::debug!(tree_empty, opaque, force_ocr, "running OCR fallback");
            match self.inspector.take_screenshot().await {
                Ok(image) if !image.is_empty() => {
                    ctx.screenshot_available = true;
                    match self.inspector.run_ocr(&image).await {
                        Ok(ocr) => attach_ocr(&mut ctx, ocr, &image),
                        Err(e) => {
                            tracing::warn!(error = %e, "OCR failed — context has no OCR text");
                            ctx.degraded = true;
                        }
                    }
                }
                Ok(_) => {
                    tracing::warn!("screenshot was empty — skipping OCR");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "screenshot unavailable — skipping OCR");
                    ctx.degraded = true;
                }
            }
        }

        tracing::debug!(
            app = %ctx.current_app.package_name,
            elements = ctx.elements.len(),
            ocr_blocks = ctx.ocr_blocks.len(),
            dialogs = ctx.system_dialogs.len(),
            degraded = ctx.degraded,
            "screen context captured"
        );

        let ctx = Arc::new(ctx);
        if let Ok(mut guard) = self.latest.lock() {
            *guard = Some(ctx.clone());
        }
        ctx
    }
}

fn attach_ocr(ctx: &mut ScreenContext, ocr: OcrResult, image: &[u8]) {
    ctx.ocr_image_size = if ocr.image_width > 0 && ocr.image_height > 0 {
        Some((ocr.image_width, ocr.image_height))
    } else {
        image_dimensions(image)
    };
    ctx.ocr_text = if ocr.text.trim().is_empty() {
        ocr.blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        ocr.text
    };
    ctx.ocr_blocks = ocr
        .blocks
        .into_iter()
        .filter(|b| !b.text.trim().is_empty())
        .collect();
}

/// Decode only the image header to learn its pixel size.
fn image_dimensions(image: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(image))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// True if any node's class name contains one of the opaque-surface hints.
pub fn looks_opaque(elements: &[Element], hints: &[String]) -> bool {
    elements.iter().any(|e| {
        let class = e.class_name.to_lowercase();
        hints.iter().any(|h| class.contains(&h.to_lowercase()))
    })
}

fn normalize_elements(raw: Vec<Element>) -> Vec<Element> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for mut e in raw {
        if !e.has_label() && !e.is_interactive() {
            continue;
        }
        let key = (
            e.text.trim().to_string(),
            e.content_description.trim().to_string(),
            e.bounds,
        );
        if !seen.insert(key) {
            continue;
        }
        e.index = out.len();
        out.push(e);
    }
    out
}

fn detect_system_dialogs(
    app: &AppInfo,
    elements: &[Element],
    dialog_packages: &[String],
) -> Vec<Element> {
    let system_foreground = dialog_packages.iter().any(|p| *p == app.package_name);
    elements
        .iter()
        .filter(|e| {
            (system_foreground && e.is_interactive())
                || e.class_name.to_lowercase().contains("dialog")
        })
        .cloned()
        .collect()
}
