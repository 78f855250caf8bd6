//! Polls the room feed and dispatches each new bubble exactly once.

use breakbot_core::{
    looks_like_sender, AttributionResolver, ChatFeed, ChatLine, Config, FeedItem, RecentSender,
    Result, TtlGuard,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::handler::{ChatHandler, Disposition};

const UNKNOWN_SENDER_KEY: &str = "unknown";

/// Splits a bubble into a name line and the message, when the first line
/// looks like a name. Otherwise the whole content is the message.
pub fn split_sender(content: &str) -> ChatLine {
    let parts: Vec<&str> = content
        .split('\n')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() >= 2 && looks_like_sender(parts[0]) {
        return ChatLine::new(Some(parts[0]), &parts[1..].join("\n"));
    }
    ChatLine::new(None, content)
}

struct ScanGuards {
    sender_message: TtlGuard<String>,
    message: TtlGuard<String>,
}

pub struct FeedScanner {
    feed: Arc<dyn ChatFeed>,
    resolver: Arc<dyn AttributionResolver>,
    handler: Arc<ChatHandler>,
    recent: Arc<Mutex<RecentSender>>,
    guards: Mutex<ScanGuards>,
    interval: Duration,
}

impl FeedScanner {
    pub fn new(
        config: &Config,
        feed: Arc<dyn ChatFeed>,
        resolver: Arc<dyn AttributionResolver>,
        handler: Arc<ChatHandler>,
        recent: Arc<Mutex<RecentSender>>,
    ) -> Self {
        Self {
            feed,
            resolver,
            handler,
            recent,
            guards: Mutex::new(ScanGuards {
                sender_message: TtlGuard::new(Duration::from_secs(
                    config.guards.sender_message_ttl_secs,
                )),
                message: TtlGuard::new(Duration::from_secs(config.guards.message_ttl_secs)),
            }),
            interval: config.scan.interval(),
        }
    }

    /// Marks everything already on screen as consumed so history is never
    /// acted upon.
    pub async fn bootstrap(&self) -> Result<usize> {
        let count = self.feed.mark_all_consumed().await?;
        info!(count, "Marked existing chat bubbles as seen");
        Ok(count)
    }

    /// One poll cycle. Returns how many items reached the handler.
    pub async fn poll_once(&self) -> Result<usize> {
        let items = self.feed.fetch_items().await?;
        let mut dispatched = 0;
        for item in items.into_iter().filter(|i| !i.consumed) {
            match self.process(&item).await {
                Ok(Some(disposition)) => {
                    dispatched += 1;
                    debug!(id = %item.id, ?disposition, "Chat item handled");
                }
                Ok(None) => {}
                Err(e) => warn!(id = %item.id, error = %e, "Failed to process chat item"),
            }
        }
        Ok(dispatched)
    }

    async fn process(&self, item: &FeedItem) -> Result<Option<Disposition>> {
        self.feed.mark_consumed(&item.id).await?;

        let content = item.text.trim();
        if content.is_empty() {
            return Ok(None);
        }

        let mut line = split_sender(content);
        if line.sender.is_none() {
            line.sender = match self.resolver.resolve_sender(&item.id).await {
                Ok(sender) => sender,
                Err(e) => {
                    debug!(id = %item.id, error = %e, "Sender lookup failed");
                    None
                }
            };
        }

        let now = Instant::now();
        if let Some(sender) = line.sender.as_deref() {
            self.recent.lock().await.observe(sender, now);
        }

        {
            let mut guards = self.guards.lock().await;
            let message = line.message.trim();
            let sender_key = format!(
                "{}::{}",
                line.sender.as_deref().unwrap_or(UNKNOWN_SENDER_KEY).trim(),
                message
            );
            let message_key = message.to_lowercase();
            if guards.sender_message.is_hit(&sender_key, now)
                || guards.message.is_hit(&message_key, now)
            {
                debug!(id = %item.id, "Repeated chat item ignored");
                return Ok(None);
            }
            guards.sender_message.record(sender_key, now);
            guards.message.record(message_key, now);
        }

        info!(
            sender = line.sender.as_deref().unwrap_or("-"),
            message = %line.message,
            "Chat message"
        );
        Ok(Some(self.handler.handle(line).await))
    }

    pub async fn run_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_ms = self.interval.as_millis() as u64, "Feed scanner started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "Feed poll failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Feed scanner shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakbot_channels::{ArbiterSettings, SendArbiter};
    use breakbot_core::testing::{MemoryFeed, RecordingInput};
    use breakbot_scheduler::BreakTimerManager;
    use tokio::time::sleep;

    struct Fixture {
        scanner: Arc<FeedScanner>,
        feed: Arc<MemoryFeed>,
        input: Arc<RecordingInput>,
    }

    fn fixture() -> Fixture {
        let config = Config::default();
        let feed = Arc::new(MemoryFeed::new());
        let input = Arc::new(RecordingInput::new());
        let arbiter = Arc::new(SendArbiter::new(input.clone(), ArbiterSettings::default()));
        let breaks = Arc::new(BreakTimerManager::new(arbiter.clone(), &config.guards));
        let recent = Arc::new(Mutex::new(RecentSender::new(Duration::from_secs(30))));
        let handler = Arc::new(ChatHandler::new(&config, arbiter, breaks, recent.clone()));
        let scanner = Arc::new(FeedScanner::new(
            &config,
            feed.clone(),
            feed.clone(),
            handler,
            recent,
        ));
        Fixture {
            scanner,
            feed,
            input,
        }
    }

    #[test]
    fn test_split_sender() {
        assert_eq!(
            split_sender("철수\n#휴식 10"),
            ChatLine::new(Some("철수"), "#휴식 10")
        );
        assert_eq!(
            split_sender("  철수 \n\n 안녕 \n 반가워 "),
            ChatLine::new(Some("철수"), "안녕\n반가워")
        );
        assert_eq!(split_sender("#휴식 10"), ChatLine::new(None, "#휴식 10"));
        // a command-shaped first line is not a name
        assert_eq!(
            split_sender("10분 휴식\n고고"),
            ChatLine::new(None, "10분 휴식\n고고")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_items_are_never_dispatched() {
        let f = fixture();
        f.feed.push("철수\n#휴식 10");
        f.feed.push("영희\n#휴식 20");
        assert_eq!(f.scanner.bootstrap().await.unwrap(), 2);
        assert_eq!(f.scanner.poll_once().await.unwrap(), 0);
        assert!(f.input.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_dispatched_at_most_once() {
        let f = fixture();
        let id = f.feed.push("철수\n안녕하세요");
        assert_eq!(f.scanner.poll_once().await.unwrap(), 1);
        assert!(f.feed.is_consumed(&id));
        assert_eq!(f.scanner.poll_once().await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_named_command_starts_break() {
        let f = fixture();
        f.scanner.bootstrap().await.unwrap();
        f.feed.push("철수\n#휴식 10");
        assert_eq!(f.scanner.poll_once().await.unwrap(), 1);

        let sent = f.input.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("10") && sent[0].contains("철수"), "{}", sent[0]);

        sleep(Duration::from_secs(10 * 60 + 5)).await;
        let sent = f.input.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].starts_with('⏰') && sent[1].contains("철수"), "{}", sent[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_supplies_sender() {
        let f = fixture();
        let id = f.feed.push("#15");
        f.feed.set_sender_hint(&id, "영희");
        f.scanner.poll_once().await.unwrap();
        let sent = f.input.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("영희"), "{}", sent[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_failure_is_contained() {
        let f = fixture();
        let broken = f.feed.push("#15");
        f.feed.break_item(&broken);
        f.feed.push("영희\n안녕");
        assert_eq!(f.scanner.poll_once().await.unwrap(), 2);
        assert!(f.feed.is_consumed(&broken));
        // unattributed command still runs with the placeholder requester
        assert!(f.input.sent()[0].contains("누군가"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_message_text_is_suppressed() {
        let f = fixture();
        f.feed.push("철수\n오늘 날씨 좋다");
        f.feed.push("영희\n오늘 날씨 좋다");
        assert_eq!(f.scanner.poll_once().await.unwrap(), 1);

        sleep(Duration::from_secs(16)).await;
        f.feed.push("영희\n오늘 날씨 좋다");
        assert_eq!(f.scanner.poll_once().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_bubbles_are_consumed_silently() {
        let f = fixture();
        let id = f.feed.push("   ");
        assert_eq!(f.scanner.poll_once().await.unwrap(), 0);
        assert!(f.feed.is_consumed(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_surfaces_from_poll() {
        let f = fixture();
        f.feed.set_fetch_fails(true);
        assert!(f.scanner.poll_once().await.is_err());
        f.feed.set_fetch_fails(false);
        assert!(f.scanner.poll_once().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_stops_on_shutdown() {
        let f = fixture();
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(f.scanner.clone().run_loop(rx));

        f.feed.push("철수\n#휴식 30");
        sleep(Duration::from_secs(3)).await;
        assert_eq!(f.input.sent().len(), 1);

        tx.send(()).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_survives_failed_polls() {
        let f = fixture();
        f.feed.set_fetch_fails(true);
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(f.scanner.clone().run_loop(rx));

        let id = f.feed.push("철수\n#휴식 30");
        sleep(Duration::from_secs(3)).await;
        assert!(f.input.sent().is_empty());
        assert!(!f.feed.is_consumed(&id));

        f.feed.set_fetch_fails(false);
        sleep(Duration::from_secs(3)).await;
        assert!(f.feed.is_consumed(&id));
        let sent = f.input.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("30") && sent[0].contains("철수"));

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
