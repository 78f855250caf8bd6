//! The bot instance: owns the send path, the timers and every cache.

use breakbot_channels::{ArbiterSettings, SendArbiter, SendOutcome};
use breakbot_core::{AttributionResolver, ChatFeed, ChatInput, Config, RecentSender, Result};
use breakbot_scheduler::{clamp_minutes, BreakInfo, BreakStart, BreakTimerManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use crate::handler::ChatHandler;
use crate::normalizer::normalize_command;
use crate::scanner::FeedScanner;

/// Requester recorded for breaks started through the command endpoint.
pub const API_REQUESTER: &str = "API";

/// Posted once after joining. Examples use `OO` placeholders so the message
/// can never parse as a command itself.
pub const GUIDANCE_MESSAGE: &str = "안녕하세요 13기 친구들!! \
예) #휴식 OO분 / \
예) #OO / \
예) OO분-휴식 / \
예) OO분 휴식하겠습니다 ← 이런 식으로 보내주시면 타이머가 시작돼요.";

pub struct BreakBot {
    arbiter: Arc<SendArbiter>,
    breaks: Arc<BreakTimerManager>,
    scanner: Arc<FeedScanner>,
    scan_enabled: bool,
}

impl BreakBot {
    pub fn new(
        config: &Config,
        feed: Arc<dyn ChatFeed>,
        resolver: Arc<dyn AttributionResolver>,
        input: Arc<dyn ChatInput>,
    ) -> Self {
        let arbiter = Arc::new(SendArbiter::new(
            input,
            ArbiterSettings::from_config(&config.sender),
        ));
        let breaks = Arc::new(BreakTimerManager::new(arbiter.clone(), &config.guards));
        let recent = Arc::new(Mutex::new(RecentSender::new(Duration::from_secs(
            config.guards.recent_sender_window_secs,
        ))));
        let handler = Arc::new(ChatHandler::new(
            config,
            arbiter.clone(),
            breaks.clone(),
            recent.clone(),
        ));
        let scanner = Arc::new(FeedScanner::new(config, feed, resolver, handler, recent));
        Self {
            arbiter,
            breaks,
            scanner,
            scan_enabled: config.scan.enabled,
        }
    }

    pub fn scan_enabled(&self) -> bool {
        self.scan_enabled
    }

    pub async fn say(&self, text: &str) -> SendOutcome {
        self.arbiter.send(text).await
    }

    pub async fn start_break(&self, minutes: i64, who: &str) -> BreakStart {
        self.breaks.start_break(minutes, who).await
    }

    /// Runs free text through the normalizer and starts a break on a match.
    /// Returns `None` when the text is not a command.
    pub async fn command(&self, text: &str) -> Option<(u32, BreakStart)> {
        let minutes = clamp_minutes(normalize_command(text)? as i64);
        let started = self.breaks.start_break(minutes as i64, API_REQUESTER).await;
        Some((minutes, started))
    }

    pub fn active_breaks(&self) -> Vec<BreakInfo> {
        self.breaks.active()
    }

    pub fn active_break_count(&self) -> usize {
        self.breaks.active_count()
    }

    /// Messages delivered and dropped since start.
    pub fn send_counters(&self) -> (u64, u64) {
        self.arbiter.counters()
    }

    /// Marks existing history consumed and posts the usage hint.
    pub async fn bootstrap(&self) -> Result<()> {
        self.scanner.bootstrap().await?;
        self.say(GUIDANCE_MESSAGE).await;
        Ok(())
    }

    /// Starts the poll loop unless scanning is disabled.
    pub fn spawn_scanner(&self, shutdown: broadcast::Receiver<()>) -> Option<JoinHandle<()>> {
        if !self.scan_enabled {
            info!("Feed scanning disabled, serving API only");
            return None;
        }
        Some(tokio::spawn(self.scanner.clone().run_loop(shutdown)))
    }

    /// Cancels every in-flight break timer.
    pub fn shutdown(&self) -> usize {
        self.breaks.cancel_all()
    }
}
