use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in integer pixels: left, top, right, bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    /// Center clamped into the rectangle shrunk by `padding` on each side.
    /// Rectangles too small to inset fall back to the plain center.
    pub fn tap_point(&self, padding: i32) -> (i32, i32) {
        let (cx, cy) = self.center();
        let x = if self.width() > padding * 2 {
            cx.clamp(self.left + padding, self.right - padding)
        } else {
            cx
        };
        let y = if self.height() > padding * 2 {
            cy.clamp(self.top + padding, self.bottom - padding)
        } else {
            cy
        };
        (x, y)
    }

    /// Every edge within `tolerance` pixels of the other rectangle's edge.
    pub fn approx_eq(&self, other: &Bounds, tolerance: i32) -> bool {
        (self.left - other.left).abs() <= tolerance
            && (self.top - other.top).abs() <= tolerance
            && (self.right - other.right).abs() <= tolerance
            && (self.bottom - other.bottom).abs() <= tolerance
    }

    pub fn scaled(&self, sx: f64, sy: f64) -> Bounds {
        Bounds {
            left: (self.left as f64 * sx).round() as i32,
            top: (self.top as f64 * sy).round() as i32,
            right: (self.right as f64 * sx).round() as i32,
            bottom: (self.bottom as f64 * sy).round() as i32,
        }
    }
}

impl std::fmt::Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{}][{},{}]", self.left, self.top, self.right, self.bottom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Element {
    /// Position in the owning context's element list.
    pub index: usize,
    pub text: String,
    pub content_description: String,
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_id: Option<String>,
    pub bounds: Bounds,
    pub clickable: bool,
    pub scrollable: bool,
    pub editable: bool,
}

impl Element {
    pub fn is_interactive(&self) -> bool {
        self.clickable || self.scrollable || self.editable
    }

    pub fn has_label(&self) -> bool {
        !self.text.trim().is_empty() || !self.content_description.trim().is_empty()
    }

    /// Text if present, otherwise the accessible label.
    pub fn display_text(&self) -> &str {
        if self.text.trim().is_empty() {
            self.content_description.trim()
        } else {
            self.text.trim()
        }
    }

    /// Short role name, e.g. `Button` for `android.widget.Button`.
    pub fn role(&self) -> &str {
        self.class_name
            .rsplit('.')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("View")
    }

    /// Stable identifier used for focus tracking across captures.
    pub fn field_key(&self) -> String {
        match &self.view_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => format!("{}@{}", self.class_name, self.bounds),
        }
    }
}

/// A recognized text fragment, boxed in OCR-image pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrBlock {
    pub text: String,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub blocks: Vec<OcrBlock>,
    /// Zero when the engine does not report the source dimensions.
    pub image_width: u32,
    pub image_height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppInfo {
    pub package_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
}

impl AppInfo {
    pub fn unknown() -> Self {
        Self {
            package_name: "unknown".into(),
            activity: None,
        }
    }
}

/// Immutable view of the screen for one loop iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenContext {
    pub current_app: AppInfo,
    pub elements: Vec<Element>,
    pub ocr_text: String,
    pub ocr_blocks: Vec<OcrBlock>,
    pub ocr_image_size: Option<(u32, u32)>,
    pub screenshot_available: bool,
    pub system_dialogs: Vec<Element>,
    /// Set when an inspector call failed while building this context.
    pub degraded: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ScreenContext {
    pub fn degraded(current_app: AppInfo) -> Self {
        Self {
            current_app,
            elements: Vec::new(),
            ocr_text: String::new(),
            ocr_blocks: Vec::new(),
            ocr_image_size: None,
            screenshot_available: false,
            system_dialogs: Vec::new(),
            degraded: true,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Rough on-screen extent: max right/bottom across all element bounds.
    pub fn estimated_screen_extent(&self) -> Option<(i32, i32)> {
        let w = self.elements.iter().map(|e| e.bounds.right).max()?;
        let h = self.elements.iter().map(|e| e.bounds.bottom).max()?;
        (w > 0 && h > 0).then_some((w, h))
    }

    pub fn has_ocr(&self) -> bool {
        !self.ocr_blocks.is_empty() || !self.ocr_text.trim().is_empty()
    }

    /// Case-insensitive presence of `needle` in element text, labels, or OCR text.
    pub fn contains_text(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }
        self.elements.iter().any(|e| {
            e.text.to_lowercase().contains(&needle)
                || e.content_description.to_lowercase().contains(&needle)
        }) || self.ocr_text.to_lowercase().contains(&needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tap_point_stays_inside_padding() {
        let b = Bounds::new(0, 0, 100, 40);
        assert_eq!(b.tap_point(4), (50, 20));
        let tiny = Bounds::new(10, 10, 14, 14);
        assert_eq!(tiny.tap_point(4), (12, 12));
    }

    #[test]
    fn approx_eq_respects_tolerance() {
        let a = Bounds::new(10, 10, 110, 60);
        assert!(a.approx_eq(&Bounds::new(14, 6, 115, 60), 5));
        assert!(!a.approx_eq(&Bounds::new(16, 10, 110, 60), 5));
    }

    #[test]
    fn role_strips_package() {
        let e = Element {
            class_name: "android.widget.Switch".into(),
            ..Default::default()
        };
        assert_eq!(e.role(), "Switch");
    }
}
