//! Scripted stand-ins for the platform traits, shared by the unit tests.
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{ClawError, ClawResult};
use crate::executor::input::{ActionExecutor, ScrollDirection};
use crate::llm::provider::DecisionOracle;
use crate::perception::traits::ScreenInspector;
use crate::perception::types::{AppInfo, Bounds, Element, OcrBlock, OcrResult, ScreenContext};

pub fn element(text: &str, bounds: Bounds, clickable: bool) -> Element {
    Element {
        index: 0,
        text: text.to_string(),
        content_description: String::new(),
        class_name: "android.widget.TextView".into(),
        view_id: None,
        bounds,
        clickable,
        scrollable: false,
        editable: false,
    }
}

pub fn context_with(elements: Vec<Element>) -> ScreenContext {
    let mut ctx = ScreenContext::degraded(AppInfo {
        package_name: "com.example".into(),
        activity: None,
    });
    ctx.degraded = false;
    ctx.elements = elements
        .into_iter()
        .enumerate()
        .map(|(i, mut e)| {
            e.index = i;
            e
        })
        .collect();
    ctx
}

/// A small solid PNG of the given size.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([240, 240, 240]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Pops the front while more than one entry is queued; the last entry repeats.
fn next_or_last<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut q = queue.lock().unwrap();
    if q.len() > 1 {
        q.pop_front()
    } else {
        q.front().cloned()
    }
}

// ── Screen inspector ──────────────────────────────────────────────────────

pub struct MockInspector {
    apps: Mutex<VecDeque<AppInfo>>,
    trees: Mutex<VecDeque<Vec<Element>>>,
    ocr_queue: Mutex<VecDeque<OcrResult>>,
    ocr: Mutex<OcrResult>,
    screenshot: Mutex<Vec<u8>>,
    tree_fails: AtomicBool,
    screenshot_fails: AtomicBool,
    ocr_count: AtomicUsize,
    screenshot_count: AtomicUsize,
}

impl MockInspector {
    pub fn new(package: &str) -> Self {
        Self {
            apps: Mutex::new(VecDeque::from([AppInfo {
                package_name: package.into(),
                activity: None,
            }])),
            trees: Mutex::new(VecDeque::new()),
            ocr_queue: Mutex::new(VecDeque::new()),
            ocr: Mutex::new(OcrResult::default()),
            screenshot: Mutex::new(png_bytes(108, 240)),
            tree_fails: AtomicBool::new(false),
            screenshot_fails: AtomicBool::new(false),
            ocr_count: AtomicUsize::new(0),
            screenshot_count: AtomicUsize::new(0),
        }
    }

    /// Foreground app for later captures, after the ones already queued.
    pub fn push_app(&self, package: &str) {
        self.apps.lock().unwrap().push_back(AppInfo {
            package_name: package.into(),
            activity: None,
        });
    }

    pub fn push_tree(&self, tree: Vec<Element>) {
        self.trees.lock().unwrap().push_back(tree);
    }

    pub fn set_ocr(&self, result: OcrResult) {
        *self.ocr.lock().unwrap() = result;
    }

    pub fn push_ocr_text(&self, text: &str) {
        self.ocr_queue.lock().unwrap().push_back(OcrResult {
            text: text.into(),
            blocks: vec![OcrBlock {
                text: text.into(),
                bounds: Bounds::new(0, 0, 100, 20),
            }],
            image_width: 0,
            image_height: 0,
        });
    }

    pub fn set_screenshot(&self, bytes: Vec<u8>) {
        *self.screenshot.lock().unwrap() = bytes;
    }

    pub fn fail_tree(&self, fail: bool) {
        self.tree_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_screenshot(&self, fail: bool) {
        self.screenshot_fails.store(fail, Ordering::SeqCst);
    }

    pub fn ocr_calls(&self) -> usize {
        self.ocr_count.load(Ordering::SeqCst)
    }

    pub fn screenshot_calls(&self) -> usize {
        self.screenshot_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenInspector for MockInspector {
    async fn accessibility_tree(&self) -> ClawResult<Vec<Element>> {
        if self.tree_fails.load(Ordering::SeqCst) {
            return Err(ClawError::InspectionFailure("service disconnected".into()));
        }
        Ok(next_or_last(&self.trees).unwrap_or_default())
    }

    async fn current_app(&self) -> ClawResult<AppInfo> {
        Ok(next_or_last(&self.apps).unwrap_or_else(AppInfo::unknown))
    }

    async fn take_screenshot(&self) -> ClawResult<Vec<u8>> {
        self.screenshot_count.fetch_add(1, Ordering::SeqCst);
        if self.screenshot_fails.load(Ordering::SeqCst) {
            return Err(ClawError::InspectionFailure("projection denied".into()));
        }
        Ok(self.screenshot.lock().unwrap().clone())
    }

    async fn run_ocr(&self, _image: &[u8]) -> ClawResult<OcrResult> {
        self.ocr_count.fetch_add(1, Ordering::SeqCst);
        Ok(next_or_last(&self.ocr_queue).unwrap_or_else(|| self.ocr.lock().unwrap().clone()))
    }
}

// ── Action executor ───────────────────────────────────────────────────────

/// Records every call as a short string such as `tap 500,150` or `scroll down`.
#[derive(Default)]
pub struct MockExecutor {
    log: Mutex<Vec<String>>,
    type_failures: AtomicU32,
    reject_all: AtomicBool,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn fail_next_types(&self, n: u32) {
        self.type_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_all(&self, fail: bool) {
        self.reject_all.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: String) -> ClawResult<()> {
        let rejected = self.reject_all.load(Ordering::SeqCst);
        self.log.lock().unwrap().push(call.clone());
        if rejected {
            Err(ClawError::Executor(format!("{call} rejected")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
    async fn tap(&self, x: i32, y: i32) -> ClawResult<()> {
        self.record(format!("tap {x},{y}"))
    }

    async fn long_press(&self, x: i32, y: i32, _duration_ms: u64) -> ClawResult<()> {
        self.record(format!("long_press {x},{y}"))
    }

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, _duration_ms: u64) -> ClawResult<()> {
        self.record(format!("swipe {x1},{y1} {x2},{y2}"))
    }

    async fn scroll(&self, direction: ScrollDirection) -> ClawResult<()> {
        self.record(format!("scroll {direction}"))
    }

    async fn type_text(&self, text: &str, _clear_first: bool, _delay_ms: u64) -> ClawResult<()> {
        let failing = self
            .type_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing || self.reject_all.load(Ordering::SeqCst) {
            self.log.lock().unwrap().push(format!("type {text} (failed)"));
            return Err(ClawError::Executor("no focused input".into()));
        }
        self.record(format!("type {text}"))
    }

    async fn key_event(&self, code: i32) -> ClawResult<()> {
        self.record(format!("key {code}"))
    }

    async fn open_app_by_name(&self, name: &str) -> ClawResult<()> {
        self.record(format!("open {name}"))
    }

    async fn back(&self) -> ClawResult<()> {
        self.record("back".into())
    }

    async fn home(&self) -> ClawResult<()> {
        self.record("home".into())
    }
}

// ── Decision oracle ───────────────────────────────────────────────────────

/// Replies with canned completions in order; errors once the script runs out.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedOracle {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> ClawResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ClawError::OracleUnavailable("script exhausted".into()))
    }
}
