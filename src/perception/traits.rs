use async_trait::async_trait;

use crate::errors::ClawResult;
use crate::perception::types::{AppInfo, Element, OcrResult};

/// Read-only view of the device screen.
/// Implemented by the platform bridge; the agent never walks the tree itself.
#[async_trait]
pub trait ScreenInspector: Send + Sync {
    /// Ranked accessibility elements. Indices are reassigned by the context builder.
    async fn accessibility_tree(&self) -> ClawResult<Vec<Element>>;

    async fn current_app(&self) -> ClawResult<AppInfo>;

    /// Encoded screenshot (PNG/JPEG).
    async fn take_screenshot(&self) -> ClawResult<Vec<u8>>;

    async fn run_ocr(&self, image: &[u8]) -> ClawResult<OcrResult>;
}
