use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths::Paths;

pub const ENV_PLAY_URL: &str = "ZEP_PLAY_URL";
pub const ENV_BOT_NAME: &str = "BOT_NAME";
pub const ENV_HEADED: &str = "BREAKBOT_HEADED";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomConfig {
    /// Play URL of the ZEP room, e.g. `https://zep.us/play/XXXXXX`.
    #[serde(default)]
    pub play_url: String,
    /// Display name used when joining as a guest. Messages from this name are
    /// never treated as commands.
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_chat_input_selector")]
    pub chat_input_selector: String,
    #[serde(default = "default_bubble_selector")]
    pub bubble_selector: String,
    #[serde(default = "default_nickname_input_selector")]
    pub nickname_input_selector: String,
    /// Button labels tried, in order, on the guest entry screen.
    #[serde(default = "default_enter_button_labels")]
    pub enter_button_labels: Vec<String>,
    /// Text of the toast ZEP shows while chat input is rate limited.
    #[serde(default = "default_cooldown_toast_text")]
    pub cooldown_toast_text: String,
}

fn default_bot_name() -> String {
    "휴식 조교".to_string()
}

fn default_chat_input_selector() -> String {
    r#"input[placeholder="채팅을 입력해 주세요"], textarea[placeholder="채팅을 입력해 주세요"]"#
        .to_string()
}

fn default_bubble_selector() -> String {
    r#"div[data-sentry-element="NewBubbleContainer"]"#.to_string()
}

fn default_nickname_input_selector() -> String {
    r#"input[type="text"]"#.to_string()
}

fn default_enter_button_labels() -> Vec<String> {
    ["Enter", "입장", "Start", "시작"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cooldown_toast_text() -> String {
    "잠시 후에 채팅을 입력할 수 있습니다".to_string()
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            play_url: String::new(),
            bot_name: default_bot_name(),
            chat_input_selector: default_chat_input_selector(),
            bubble_selector: default_bubble_selector(),
            nickname_input_selector: default_nickname_input_selector(),
            enter_button_labels: default_enter_button_labels(),
            cooldown_toast_text: default_cooldown_toast_text(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    #[serde(default = "default_scan_enabled")]
    pub enabled: bool,
    #[serde(default = "default_scan_interval_ms")]
    pub interval_ms: u64,
    /// Delay before falling back to the recent sender for unattributed commands.
    #[serde(default = "default_attribution_wait_ms")]
    pub attribution_wait_ms: u64,
    /// Minimum spacing between "returned" acknowledgements.
    #[serde(default = "default_ack_cooldown_ms")]
    pub ack_cooldown_ms: u64,
}

fn default_scan_enabled() -> bool {
    true
}

fn default_scan_interval_ms() -> u64 {
    1000
}

fn default_attribution_wait_ms() -> u64 {
    250
}

fn default_ack_cooldown_ms() -> u64 {
    2000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: default_scan_enabled(),
            interval_ms: default_scan_interval_ms(),
            attribution_wait_ms: default_attribution_wait_ms(),
            ack_cooldown_ms: default_ack_cooldown_ms(),
        }
    }
}

impl ScanConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn attribution_wait(&self) -> Duration {
        Duration::from_millis(self.attribution_wait_ms)
    }

    pub fn ack_cooldown(&self) -> Duration {
        Duration::from_millis(self.ack_cooldown_ms)
    }
}

/// TTLs of the suppression tables, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardConfig {
    #[serde(default = "default_sender_message_ttl")]
    pub sender_message_ttl_secs: u64,
    #[serde(default = "default_message_ttl")]
    pub message_ttl_secs: u64,
    #[serde(default = "default_sentence_ttl")]
    pub sentence_ttl_secs: u64,
    #[serde(default = "default_requester_minutes_ttl")]
    pub requester_minutes_ttl_secs: u64,
    #[serde(default = "default_global_minutes_ttl")]
    pub global_minutes_ttl_secs: u64,
    #[serde(default = "default_recent_sender_window")]
    pub recent_sender_window_secs: u64,
}

fn default_sender_message_ttl() -> u64 {
    8
}

fn default_message_ttl() -> u64 {
    15
}

fn default_sentence_ttl() -> u64 {
    10
}

fn default_requester_minutes_ttl() -> u64 {
    15
}

fn default_global_minutes_ttl() -> u64 {
    10
}

fn default_recent_sender_window() -> u64 {
    30
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            sender_message_ttl_secs: default_sender_message_ttl(),
            message_ttl_secs: default_message_ttl(),
            sentence_ttl_secs: default_sentence_ttl(),
            requester_minutes_ttl_secs: default_requester_minutes_ttl(),
            global_minutes_ttl_secs: default_global_minutes_ttl(),
            recent_sender_window_secs: default_recent_sender_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderConfig {
    #[serde(default = "default_min_send_interval_ms")]
    pub min_send_interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Wait after submitting before re-checking the rate-limit indicator.
    #[serde(default = "default_post_submit_check_ms")]
    pub post_submit_check_ms: u64,
    #[serde(default = "default_post_send_settle_ms")]
    pub post_send_settle_ms: u64,
}

fn default_min_send_interval_ms() -> u64 {
    1800
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    800
}

fn default_backoff_multiplier() -> f64 {
    1.6
}

fn default_max_backoff_ms() -> u64 {
    6000
}

fn default_post_submit_check_ms() -> u64 {
    120
}

fn default_post_send_settle_ms() -> u64 {
    50
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            min_send_interval_ms: default_min_send_interval_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            post_submit_check_ms: default_post_submit_check_ms(),
            post_send_settle_ms: default_post_send_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Launch a visible window instead of a headless one.
    #[serde(default)]
    pub headed: bool,
    /// Explicit Chrome/Chromium binary. Discovered on PATH when unset.
    #[serde(default)]
    pub binary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub guards: GuardConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reads `.env` (if present) into the process environment, then applies
    /// the environment overrides.
    pub fn apply_env(&mut self) {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "Failed to read .env"),
        }
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_PLAY_URL).filter(|v| !v.trim().is_empty()) {
            self.room.play_url = url.trim().to_string();
        }
        if let Some(name) = lookup(ENV_BOT_NAME).filter(|v| !v.trim().is_empty()) {
            self.room.bot_name = name.trim().to_string();
        }
        if let Some(headed) = lookup(ENV_HEADED) {
            self.browser.headed = matches!(
                headed.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }

    /// Checks everything the bot cannot start without.
    pub fn validate(&self) -> Result<()> {
        let raw = self.room.play_url.trim();
        if raw.is_empty() {
            return Err(Error::Config(format!(
                "room.playUrl is empty (set {} in .env or config.json)",
                ENV_PLAY_URL
            )));
        }
        let parsed = url::Url::parse(raw)
            .map_err(|e| Error::Config(format!("room.playUrl is not a valid URL: {}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::Config(format!(
                "room.playUrl must be http(s), got '{}'",
                parsed.scheme()
            )));
        }
        if self.room.bot_name.trim().is_empty() {
            return Err(Error::Config("room.botName must not be empty".to_string()));
        }
        if self.sender.max_attempts == 0 {
            return Err(Error::Config("sender.maxAttempts must be at least 1".to_string()));
        }
        if self.scan.interval_ms == 0 {
            return Err(Error::Config("scan.intervalMs must be at least 1".to_string()));
        }
        Ok(())
    }
}
