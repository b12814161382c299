use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ClawError, ClawResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub scroller: ScrollerConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Use SSE streaming for the completion call.
    #[serde(default)]
    pub stream: bool,
    /// Optional API key stored in config.toml (falls back to env var POCKETCLAW_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Minimum spacing between two oracle calls.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            display_name: "OpenAI".into(),
            api_base: "https://api.openai.com/v1/chat/completions".into(),
            model: "gpt-4o-mini".into(),
            temperature: default_temperature(),
            stream: false,
            api_key: None,
            min_interval_ms: default_min_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OracleConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Key from the environment first, then from config.toml.
    pub fn resolved_api_key(&self) -> String {
        std::env::var("POCKETCLAW_API_KEY")
            .unwrap_or_else(|_| self.api_key.clone().unwrap_or_default())
    }
}

fn default_temperature() -> f64 {
    0.1
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Class-name fragments that mark a surface whose content the tree cannot see.
    #[serde(default = "default_opaque_class_hints")]
    pub opaque_class_hints: Vec<String>,
    /// Foreground packages whose interactive elements are reported as system dialogs.
    #[serde(default = "default_system_dialog_packages")]
    pub system_dialog_packages: Vec<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            opaque_class_hints: default_opaque_class_hints(),
            system_dialog_packages: default_system_dialog_packages(),
        }
    }
}

fn default_opaque_class_hints() -> Vec<String> {
    [
        "webview",
        "webkit",
        "chromium",
        "canvas",
        "surfaceview",
        "textureview",
        "flutterview",
        "unityplayer",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_system_dialog_packages() -> Vec<String> {
    [
        "com.android.systemui",
        "com.android.permissioncontroller",
        "com.google.android.permissioncontroller",
        "android",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Pixel tolerance when matching oracle-supplied bounds to an element.
    #[serde(default = "default_bounds_tolerance")]
    pub bounds_tolerance_px: i32,
    /// Inset kept between the tap point and the element edge.
    #[serde(default = "default_tap_padding")]
    pub tap_padding_px: i32,
    #[serde(default = "default_token_weight")]
    pub token_weight: f64,
    #[serde(default = "default_prefix_weight")]
    pub prefix_weight: f64,
    /// Best OCR block scoring below this is treated as a miss.
    #[serde(default = "default_min_ocr_score")]
    pub min_ocr_score: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            bounds_tolerance_px: default_bounds_tolerance(),
            tap_padding_px: default_tap_padding(),
            token_weight: default_token_weight(),
            prefix_weight: default_prefix_weight(),
            min_ocr_score: default_min_ocr_score(),
        }
    }
}

fn default_bounds_tolerance() -> i32 {
    5
}

fn default_tap_padding() -> i32 {
    4
}

fn default_token_weight() -> f64 {
    0.7
}

fn default_prefix_weight() -> f64 {
    0.3
}

fn default_min_ocr_score() -> f64 {
    0.25
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrollerConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Identical consecutive snapshots before a direction counts as exhausted.
    #[serde(default = "default_identical_threshold")]
    pub identical_threshold: u32,
    #[serde(default = "default_scroll_wait_ms")]
    pub wait_ms: u64,
    /// Share of target words that must appear in OCR text for a fuzzy hit.
    #[serde(default = "default_word_ratio")]
    pub fuzzy_word_ratio: f64,
}

impl Default for ScrollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            identical_threshold: default_identical_threshold(),
            wait_ms: default_scroll_wait_ms(),
            fuzzy_word_ratio: default_word_ratio(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_identical_threshold() -> u32 {
    2
}

fn default_scroll_wait_ms() -> u64 {
    1500
}

fn default_word_ratio() -> f64 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Number of leading elements compared by the unchanged-context check.
    #[serde(default = "default_unchanged_depth")]
    pub unchanged_depth: usize,
    #[serde(default = "default_unchanged_window_ms")]
    pub unchanged_window_ms: u64,
    #[serde(default = "default_unchanged_retry_ms")]
    pub unchanged_retry_ms: u64,
    #[serde(default = "default_tap_wait_ms")]
    pub tap_wait_ms: u64,
    #[serde(default = "default_type_wait_ms")]
    pub type_wait_ms: u64,
    #[serde(default = "default_gesture_wait_ms")]
    pub gesture_wait_ms: u64,
    #[serde(default = "default_app_launch_wait_ms")]
    pub app_launch_wait_ms: u64,
    #[serde(default = "default_type_delay_ms")]
    pub type_delay_ms: u64,
    /// Steps included in the prompt history.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            unchanged_depth: default_unchanged_depth(),
            unchanged_window_ms: default_unchanged_window_ms(),
            unchanged_retry_ms: default_unchanged_retry_ms(),
            tap_wait_ms: default_tap_wait_ms(),
            type_wait_ms: default_type_wait_ms(),
            gesture_wait_ms: default_gesture_wait_ms(),
            app_launch_wait_ms: default_app_launch_wait_ms(),
            type_delay_ms: default_type_delay_ms(),
            history_window: default_history_window(),
        }
    }
}

impl AutomationConfig {
    pub fn unchanged_window(&self) -> Duration {
        Duration::from_millis(self.unchanged_window_ms)
    }

    pub fn unchanged_retry(&self) -> Duration {
        Duration::from_millis(self.unchanged_retry_ms)
    }
}

fn default_unchanged_depth() -> usize {
    5
}

fn default_unchanged_window_ms() -> u64 {
    3000
}

fn default_unchanged_retry_ms() -> u64 {
    500
}

fn default_tap_wait_ms() -> u64 {
    600
}

fn default_type_wait_ms() -> u64 {
    400
}

fn default_gesture_wait_ms() -> u64 {
    2000
}

fn default_app_launch_wait_ms() -> u64 {
    2500
}

fn default_type_delay_ms() -> u64 {
    30
}

fn default_history_window() -> usize {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Finished tasks older than this are pruned from the queue.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
        }
    }
}

fn default_retention_secs() -> u64 {
    60
}

fn resolve_config_path() -> ClawResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(ClawError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> ClawResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), model = %config.oracle.model, "config loaded");
    Ok(config)
}

/// Like `load_config`, but a missing file yields the defaults.
pub fn load_config_or_default() -> ClawResult<AppConfig> {
    match resolve_config_path() {
        Ok(_) => load_config(),
        Err(e) => {
            tracing::warn!(reason = %e, "using default configuration");
            Ok(AppConfig::default())
        }
    }
}

pub fn parse_config(content: &str) -> ClawResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if !(0.0..=1.0).contains(&config.resolver.min_ocr_score) {
        return Err(ClawError::Config(format!(
            "resolver.min_ocr_score must be within 0..=1, got {}",
            config.resolver.min_ocr_score
        )));
    }
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> ClawResult<()> {
    let path = resolve_config_path()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.automation.unchanged_depth, 5);
        assert_eq!(cfg.resolver.bounds_tolerance_px, 5);
        assert_eq!(cfg.scroller.identical_threshold, 2);
        assert_eq!(cfg.voice.retention_secs, 60);
        assert!((cfg.resolver.min_ocr_score - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_sections_override_defaults() {
        let cfg = parse_config(
            r#"
            [oracle]
            display_name = "Local"
            api_base = "http://localhost:8080/v1/chat/completions"
            model = "qwen2.5"
            stream = true

            [automation]
            unchanged_depth = 8
            "#,
        )
        .unwrap();
        assert_eq!(cfg.oracle.model, "qwen2.5");
        assert!(cfg.oracle.stream);
        assert_eq!(cfg.oracle.min_interval_ms, 1000);
        assert_eq!(cfg.automation.unchanged_depth, 8);
        assert_eq!(cfg.automation.gesture_wait_ms, 2000);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = parse_config("[resolver]\nmin_ocr_score = 1.5\n").unwrap_err();
        assert!(matches!(err, ClawError::Config(_)));
    }
}
