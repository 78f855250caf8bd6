use breakbot_channels::SendArbiter;
use breakbot_core::config::GuardConfig;
use breakbot_core::TtlGuard;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::announce::{end_announcement, start_announcement};

pub const MIN_BREAK_MINUTES: u32 = 1;
pub const MAX_BREAK_MINUTES: u32 = 180;

/// Requester used when nobody can be attributed.
pub const UNKNOWN_REQUESTER: &str = "누군가";

pub fn clamp_minutes(minutes: i64) -> u32 {
    minutes.clamp(MIN_BREAK_MINUTES as i64, MAX_BREAK_MINUTES as i64) as u32
}

/// A break currently in progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakInfo {
    pub id: String,
    pub minutes: u32,
    pub who: String,
    pub started_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakRejection {
    /// The same duration was started by anyone within the global window.
    MinuteGuard,
    /// The same requester asked for the same duration within its window.
    UserMinuteGuard,
}

impl BreakRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            BreakRejection::MinuteGuard => "minute-guard",
            BreakRejection::UserMinuteGuard => "user-minute-guard",
        }
    }
}

impl std::fmt::Display for BreakRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BreakStart {
    Started(BreakInfo),
    Rejected(BreakRejection),
}

impl BreakStart {
    pub fn is_started(&self) -> bool {
        matches!(self, BreakStart::Started(_))
    }
}

struct BreakGuards {
    global_minutes: TtlGuard<u32>,
    requester_minutes: TtlGuard<String>,
}

struct ActiveBreak {
    info: BreakInfo,
    handle: JoinHandle<()>,
}

type TimerSet = Arc<StdMutex<HashMap<String, ActiveBreak>>>;

/// Removes its timer from the active set when the timer task finishes or is
/// dropped by cancellation.
struct TimerSlot {
    id: String,
    timers: TimerSet,
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.remove(&self.id);
    }
}

/// Owns in-flight break timers and the guards that limit how fast they can
/// be created.
pub struct BreakTimerManager {
    arbiter: Arc<SendArbiter>,
    guards: Mutex<BreakGuards>,
    timers: TimerSet,
    minute: Duration,
    max_jitter: Duration,
}

impl BreakTimerManager {
    pub fn new(arbiter: Arc<SendArbiter>, guards: &GuardConfig) -> Self {
        Self {
            arbiter,
            guards: Mutex::new(BreakGuards {
                global_minutes: TtlGuard::new(Duration::from_secs(guards.global_minutes_ttl_secs)),
                requester_minutes: TtlGuard::new(Duration::from_secs(
                    guards.requester_minutes_ttl_secs,
                )),
            }),
            timers: Arc::new(StdMutex::new(HashMap::new())),
            minute: Duration::from_secs(60),
            max_jitter: Duration::from_millis(700),
        }
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub async fn start_break(&self, minutes: i64, who: &str) -> BreakStart {
        let minutes = clamp_minutes(minutes);
        let who = if who.trim().is_empty() {
            UNKNOWN_REQUESTER
        } else {
            who.trim()
        };

        {
            let mut guards = self.guards.lock().await;
            let now = Instant::now();
            if guards.global_minutes.check_and_record(minutes, now) {
                debug!(minutes, "Global minute guard hit");
                return BreakStart::Rejected(BreakRejection::MinuteGuard);
            }
            let key = format!("{}::{}", who, minutes);
            if guards.requester_minutes.check_and_record(key, now) {
                debug!(minutes, who = %who, "Requester minute guard hit");
                return BreakStart::Rejected(BreakRejection::UserMinuteGuard);
            }
        }

        let (start_text, end_text, jitter) = {
            let mut rng = rand::thread_rng();
            let jitter_ms = rng.gen_range(0..=self.max_jitter.as_millis() as u64);
            (
                start_announcement(&mut rng, minutes, who),
                end_announcement(&mut rng, minutes, who),
                Duration::from_millis(jitter_ms),
            )
        };

        let outcome = self.arbiter.send(&start_text).await;
        if !outcome.is_sent() {
            warn!(minutes, who = %who, ?outcome, "Break start announcement was not delivered");
        }

        let length = self.minute * minutes;
        let started_at = Utc::now();
        let info = BreakInfo {
            id: uuid::Uuid::new_v4().to_string(),
            minutes,
            who: who.to_string(),
            started_at,
            ends_at: started_at + chrono::Duration::from_std(length)
                .unwrap_or_else(|_| chrono::Duration::zero()),
        };

        let slot = TimerSlot {
            id: info.id.clone(),
            timers: self.timers.clone(),
        };
        let arbiter = self.arbiter.clone();
        let task_info = info.clone();

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        let handle = tokio::spawn(async move {
            let _slot = slot;
            sleep(length + jitter).await;
            let outcome = arbiter.send(&end_text).await;
            info!(
                id = %task_info.id,
                minutes = task_info.minutes,
                who = %task_info.who,
                delivered = outcome.is_sent(),
                "Break finished"
            );
        });
        timers.insert(
            info.id.clone(),
            ActiveBreak {
                info: info.clone(),
                handle,
            },
        );
        drop(timers);

        info!(id = %info.id, minutes, who = %who, "Break started");
        BreakStart::Started(info)
    }

    /// Breaks still waiting for their end announcement, soonest first.
    pub fn active(&self) -> Vec<BreakInfo> {
        let timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<BreakInfo> = timers.values().map(|b| b.info.clone()).collect();
        list.sort_by_key(|b| b.ends_at);
        list
    }

    pub fn active_count(&self) -> usize {
        self.timers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Aborts every in-flight timer; their end announcements are never sent.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<ActiveBreak> = {
            let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
            timers.drain().map(|(_, b)| b).collect()
        };
        for active in &drained {
            active.handle.abort();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Cancelled in-flight breaks");
        }
        drained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakbot_channels::ArbiterSettings;
    use breakbot_core::testing::RecordingInput;

    fn manager() -> (BreakTimerManager, Arc<RecordingInput>) {
        let input = Arc::new(RecordingInput::new());
        let arbiter = Arc::new(SendArbiter::new(input.clone(), ArbiterSettings::default()));
        let mgr = BreakTimerManager::new(arbiter, &GuardConfig::default());
        (mgr, input)
    }

    #[test]
    fn test_clamp_minutes() {
        assert_eq!(clamp_minutes(300), 180);
        assert_eq!(clamp_minutes(0), 1);
        assert_eq!(clamp_minutes(-5), 1);
        assert_eq!(clamp_minutes(45), 45);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_announces_minutes_and_requester() {
        let (mgr, input) = manager();
        let started = mgr.start_break(10, "철수").await;
        assert!(started.is_started());

        let sent = input.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("10"));
        assert!(sent[0].contains("철수"));
        assert_eq!(mgr.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_limit_is_clamped_before_guards() {
        let (mgr, _input) = manager();
        match mgr.start_break(300, "API").await {
            BreakStart::Started(info) => assert_eq!(info.minutes, 180),
            other => panic!("unexpected {:?}", other),
        }
        // 180 is now guarded even when asked for as 500
        assert_eq!(
            mgr.start_break(500, "someone else").await,
            BreakStart::Rejected(BreakRejection::MinuteGuard)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_guard_ignores_requester() {
        let (mgr, input) = manager();
        assert!(mgr.start_break(10, "철수").await.is_started());
        assert_eq!(
            mgr.start_break(10, "영희").await,
            BreakStart::Rejected(BreakRejection::MinuteGuard)
        );
        assert!(mgr.start_break(15, "영희").await.is_started());
        assert_eq!(input.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requester_guard_outlives_global_guard() {
        let (mgr, _input) = manager();
        assert!(mgr.start_break(10, "철수").await.is_started());
        sleep(Duration::from_secs(11)).await;
        assert_eq!(
            mgr.start_break(10, "철수").await,
            BreakStart::Rejected(BreakRejection::UserMinuteGuard)
        );
        // the rejected attempt still refreshed the global window
        assert_eq!(
            mgr.start_break(10, "영희").await,
            BreakStart::Rejected(BreakRejection::MinuteGuard)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_announcement_after_duration() {
        let (mgr, input) = manager();
        let started = mgr.start_break(1, "철수").await;
        assert!(started.is_started());

        sleep(Duration::from_secs(59)).await;
        assert_eq!(input.sent().len(), 1);

        sleep(Duration::from_secs(5)).await;
        let sent = input.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].starts_with('⏰'));
        assert!(sent[1].contains("철수"));
        assert_eq!(mgr.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_without_jitter_is_on_the_minute() {
        let (mgr, input) = manager();
        let mgr = mgr.with_max_jitter(Duration::ZERO);
        assert!(mgr.start_break(1, "철수").await.is_started());

        sleep(Duration::from_millis(59_900)).await;
        assert_eq!(input.sent().len(), 1);
        sleep(Duration::from_millis(300)).await;
        assert_eq!(input.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_timers_for_different_durations() {
        let (mgr, input) = manager();
        assert!(mgr.start_break(2, "철수").await.is_started());
        assert!(mgr.start_break(1, "영희").await.is_started());
        let active = mgr.active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].minutes, 1);

        sleep(Duration::from_secs(3 * 60)).await;
        assert_eq!(input.sent().len(), 4);
        assert!(mgr.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_suppresses_end_announcements() {
        let (mgr, input) = manager();
        assert!(mgr.start_break(1, "철수").await.is_started());
        assert!(mgr.start_break(2, "영희").await.is_started());
        assert_eq!(mgr.cancel_all(), 2);
        assert_eq!(mgr.active_count(), 0);

        sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(input.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_announcement_still_starts_timer() {
        let (mgr, input) = manager();
        input.set_rate_limited(true);
        let started = mgr.start_break(5, "철수").await;
        assert!(started.is_started());
        assert!(input.sent().is_empty());
        assert_eq!(mgr.active_count(), 1);
    }
}
