//! Decides what to do with one attributed chat line.

use breakbot_channels::SendArbiter;
use breakbot_core::{ChatLine, Config, RecentSender, TtlGuard};
use breakbot_scheduler::{clamp_minutes, BreakStart, BreakTimerManager, UNKNOWN_REQUESTER};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::normalizer::{is_pure_digits, normalize_command};

/// Replies to "I'm back" messages.
pub const ACK_REPLIES: &[&str] = &["넵", "넵!!", "복귀 확인! 👋", "이제 공부 ㄱㄱ 🚀"];

/// Our own announcement variants and the phrasing of usage hints.
static START_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:#?\s*휴식\s*\d+\s*분\s*시작\s*-\s*by)|(?:\d+\s*분\s*쉬어요)|(?:가즈아)|(?:처럼\s*입력(?:하면|해))|(?:입력하면\s*타이머)",
    )
    .unwrap()
});

static RETURN_NOTICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)복귀(했|함|요|완료)?").unwrap());

/// Announcements, replies and hints that must never be read back as
/// commands or return notices.
pub fn is_noise(text: &str) -> bool {
    text.contains("시작 - by")
        || text.contains("종료 - ")
        || ACK_REPLIES.contains(&text.trim())
        || START_NOISE.is_match(text)
}

/// Whether `text` reports someone coming back from a break.
pub fn is_return_notice(text: &str) -> bool {
    RETURN_NOTICE.is_match(text)
}

/// Lowercased text with whitespace runs collapsed to one space.
fn sentence_key(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// How a chat line was dealt with.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    SelfEcho,
    Noise,
    PureDigits,
    Acknowledged,
    AckCooldown,
    DuplicateSentence,
    NoCommand,
    Break(BreakStart),
}

pub struct ChatHandler {
    bot_name: String,
    arbiter: Arc<SendArbiter>,
    breaks: Arc<BreakTimerManager>,
    recent: Arc<Mutex<RecentSender>>,
    sentences: Mutex<TtlGuard<String>>,
    next_ack: Mutex<Option<Instant>>,
    attribution_wait: Duration,
    ack_cooldown: Duration,
}

impl ChatHandler {
    pub fn new(
        config: &Config,
        arbiter: Arc<SendArbiter>,
        breaks: Arc<BreakTimerManager>,
        recent: Arc<Mutex<RecentSender>>,
    ) -> Self {
        Self {
            bot_name: config.room.bot_name.trim().to_string(),
            arbiter,
            breaks,
            recent,
            sentences: Mutex::new(TtlGuard::new(Duration::from_secs(
                config.guards.sentence_ttl_secs,
            ))),
            next_ack: Mutex::new(None),
            attribution_wait: config.scan.attribution_wait(),
            ack_cooldown: config.scan.ack_cooldown(),
        }
    }

    pub async fn handle(&self, line: ChatLine) -> Disposition {
        let text = line.message.trim();

        if line
            .sender
            .as_deref()
            .map(|s| s.trim() == self.bot_name)
            .unwrap_or(false)
        {
            return Disposition::SelfEcho;
        }
        if is_noise(text) {
            return Disposition::Noise;
        }
        if is_pure_digits(text) {
            return Disposition::PureDigits;
        }

        if is_return_notice(text) {
            return self.acknowledge().await;
        }

        if self
            .sentences
            .lock()
            .await
            .check_and_record(sentence_key(text), Instant::now())
        {
            debug!(text = %text, "Duplicate sentence ignored");
            return Disposition::DuplicateSentence;
        }

        let Some(minutes) = normalize_command(text) else {
            return Disposition::NoCommand;
        };
        let minutes = clamp_minutes(minutes as i64);

        let who = match line.sender {
            Some(sender) => sender,
            None => self.backfill_sender().await,
        };
        debug!(minutes, who = %who, "Break command");
        Disposition::Break(self.breaks.start_break(minutes as i64, &who).await)
    }

    async fn acknowledge(&self) -> Disposition {
        {
            let mut next = self.next_ack.lock().await;
            let now = Instant::now();
            if next.map(|at| now < at).unwrap_or(false) {
                return Disposition::AckCooldown;
            }
            *next = Some(now + self.ack_cooldown);
        }
        let reply = ACK_REPLIES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(ACK_REPLIES[0]);
        self.arbiter.send(reply).await;
        Disposition::Acknowledged
    }

    /// Gives the feed a moment to attribute someone, then falls back to the
    /// most recent fresh sender or the placeholder.
    async fn backfill_sender(&self) -> String {
        sleep(self.attribution_wait).await;
        let recent = self.recent.lock().await;
        recent
            .fresh(Instant::now())
            .unwrap_or(UNKNOWN_REQUESTER)
            .to_string()
    }
}
