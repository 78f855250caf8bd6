//! Serialized, backoff-aware outbound gateway for the room chat.
//!
//! Every outbound message goes through [`SendArbiter::send`]. The gate mutex is
//! held for the whole send, so two sends never interleave their
//! clear/type/submit sequences. Failures are logged and reported as a
//! [`SendOutcome`]; they never surface as errors to the caller.

use breakbot_core::config::SenderConfig;
use breakbot_core::{ChatInput, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::gate::SendGate;

#[derive(Debug, Clone)]
pub struct ArbiterSettings {
    pub min_interval: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
    pub post_submit_check: Duration,
    pub post_send_settle: Duration,
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self::from_config(&SenderConfig::default())
    }
}

impl ArbiterSettings {
    pub fn from_config(cfg: &SenderConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(cfg.min_send_interval_ms),
            max_attempts: cfg.max_attempts.max(1),
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            backoff_multiplier: cfg.backoff_multiplier.max(1.0),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
            post_submit_check: Duration::from_millis(cfg.post_submit_check_ms),
            post_send_settle: Duration::from_millis(cfg.post_send_settle_ms),
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_multiplier).min(self.max_backoff)
    }
}

/// What happened to one `send` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { attempts: u32 },
    /// The input control could not be located; nothing was retried.
    NoInput,
    /// Every attempt hit the rate limit or failed.
    Exhausted { attempts: u32 },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

pub struct SendArbiter {
    input: Arc<dyn ChatInput>,
    settings: ArbiterSettings,
    gate: Mutex<SendGate>,
    sent: AtomicU64,
    dropped: AtomicU64,
}

impl SendArbiter {
    pub fn new(input: Arc<dyn ChatInput>, settings: ArbiterSettings) -> Self {
        let gate = SendGate::new(settings.min_interval);
        Self {
            input,
            settings,
            gate: Mutex::new(gate),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Number of messages delivered and dropped since start.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.sent.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
        )
    }

    pub async fn send(&self, text: &str) -> SendOutcome {
        let mut gate = self.gate.lock().await;

        if let Some(wait) = gate.cooldown_remaining(Instant::now()) {
            debug!(wait_ms = wait.as_millis() as u64, "Waiting out chat cooldown");
            sleep(wait).await;
        }
        if let Some(wait) = gate.gap_remaining(Instant::now()) {
            sleep(wait).await;
        }

        match self.input.input_available().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Chat input not found, dropping message");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return SendOutcome::NoInput;
            }
            Err(e) => {
                warn!(error = %e, "Failed to locate chat input, dropping message");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return SendOutcome::NoInput;
            }
        }

        let mut backoff = self.settings.initial_backoff;
        for attempt in 1..=self.settings.max_attempts {
            match self.input.rate_limited().await {
                Ok(true) => {
                    debug!(attempt, backoff_ms = backoff.as_millis() as u64, "Rate-limit indicator visible");
                    gate.extend_cooldown(Instant::now(), backoff);
                    sleep(backoff).await;
                    backoff = self.settings.next_backoff(backoff);
                    continue;
                }
                Ok(false) => {}
                Err(e) => debug!(error = %e, "Rate-limit check failed, attempting anyway"),
            }

            match self.attempt(text).await {
                Ok(()) => {
                    gate.record_send(Instant::now());
                    self.sent.fetch_add(1, Ordering::Relaxed);
                    info!(attempt, text = %text, "Chat message sent");
                    sleep(self.settings.post_send_settle).await;
                    return SendOutcome::Sent { attempts: attempt };
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Send attempt failed");
                    gate.extend_cooldown(Instant::now(), backoff);
                    sleep(backoff).await;
                    backoff = self.settings.next_backoff(backoff);
                }
            }
        }

        warn!(attempts = self.settings.max_attempts, text = %text, "Giving up on chat message");
        self.dropped.fetch_add(1, Ordering::Relaxed);
        SendOutcome::Exhausted {
            attempts: self.settings.max_attempts,
        }
    }

    /// One clear/type/submit round. The indicator may appear right after
    /// submitting, in which case the text counts as not delivered.
    async fn attempt(&self, text: &str) -> Result<()> {
        self.input.submit(text).await?;
        sleep(self.settings.post_submit_check).await;
        if self.input.rate_limited().await? {
            return Err(breakbot_core::Error::Channel(
                "rate limited right after submit".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use breakbot_core::Error;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    /// In-memory chat input with scriptable failures.
    #[derive(Default)]
    pub struct FakeInput {
        pub missing: bool,
        /// Number of upcoming `rate_limited` checks that report true.
        pub limited_checks: AtomicU32,
        pub always_limited: bool,
        /// Number of upcoming submits that fail.
        pub failing_submits: AtomicU32,
        /// Number of upcoming successful submits that raise the indicator.
        pub limit_after_submit: AtomicU32,
        pub submit_delay: Duration,
        pub log: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatInput for FakeInput {
        async fn input_available(&self) -> Result<bool> {
            Ok(!self.missing)
        }

        async fn rate_limited(&self) -> Result<bool> {
            if self.always_limited {
                return Ok(true);
            }
            let left = self.limited_checks.load(Ordering::SeqCst);
            if left > 0 {
                self.limited_checks.store(left - 1, Ordering::SeqCst);
                return Ok(true);
            }
            Ok(false)
        }

        async fn submit(&self, text: &str) -> Result<()> {
            let left = self.failing_submits.load(Ordering::SeqCst);
            if left > 0 {
                self.failing_submits.store(left - 1, Ordering::SeqCst);
                return Err(Error::Browser("element detached".to_string()));
            }
            self.log.lock().unwrap().push(format!("begin:{}", text));
            sleep(self.submit_delay).await;
            self.log.lock().unwrap().push(format!("end:{}", text));
            let raise = self.limit_after_submit.load(Ordering::SeqCst);
            if raise > 0 {
                self.limit_after_submit.store(raise - 1, Ordering::SeqCst);
                self.limited_checks.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    fn arbiter(input: Arc<FakeInput>) -> SendArbiter {
        SendArbiter::new(input, ArbiterSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_success() {
        let input = Arc::new(FakeInput::default());
        let arb = arbiter(input.clone());
        assert_eq!(arb.send("안녕").await, SendOutcome::Sent { attempts: 1 });
        assert_eq!(
            *input.log.lock().unwrap(),
            vec!["begin:안녕".to_string(), "end:안녕".to_string()]
        );
        assert_eq!(arb.counters(), (1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_gap_between_sends() {
        let input = Arc::new(FakeInput::default());
        let arb = arbiter(input);
        let start = Instant::now();
        arb.send("a").await;
        let first_done = Instant::now();
        arb.send("b").await;
        // second send waits for the 1.8s gap counted from the first success
        assert!(Instant::now() - start >= Duration::from_millis(1800));
        assert!(Instant::now() - first_done >= Duration::from_millis(1700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_input_is_not_retried() {
        let input = Arc::new(FakeInput {
            missing: true,
            ..Default::default()
        });
        let arb = arbiter(input.clone());
        assert_eq!(arb.send("x").await, SendOutcome::NoInput);
        assert!(input.log.lock().unwrap().is_empty());
        assert_eq!(arb.counters(), (0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_every_attempt_gives_up() {
        let input = Arc::new(FakeInput {
            always_limited: true,
            ..Default::default()
        });
        let arb = arbiter(input.clone());
        let start = Instant::now();
        assert_eq!(arb.send("x").await, SendOutcome::Exhausted { attempts: 10 });
        assert!(input.log.lock().unwrap().is_empty());

        // 0.8 + 1.28 + 2.048 + 3.2768 + 5.24288 + 5 * 6 seconds of backoff
        let elapsed = Instant::now() - start;
        assert!(elapsed >= Duration::from_millis(42_600), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_error_is_retried() {
        let input = Arc::new(FakeInput::default());
        input.failing_submits.store(2, Ordering::SeqCst);
        let arb = arbiter(input.clone());
        assert_eq!(arb.send("x").await, SendOutcome::Sent { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_indicator_after_submit_counts_as_failure() {
        let input = Arc::new(FakeInput::default());
        input.limit_after_submit.store(1, Ordering::SeqCst);
        let arb = arbiter(input.clone());
        assert_eq!(arb.send("x").await, SendOutcome::Sent { attempts: 2 });
        assert_eq!(input.log.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_sends_do_not_interleave() {
        let input = Arc::new(FakeInput {
            submit_delay: Duration::from_millis(300),
            ..Default::default()
        });
        let arb = Arc::new(arbiter(input.clone()));

        let a = {
            let arb = arb.clone();
            tokio::spawn(async move { arb.send("a").await })
        };
        let b = {
            let arb = arb.clone();
            tokio::spawn(async move { arb.send("b").await })
        };
        assert!(a.await.unwrap().is_sent());
        assert!(b.await.unwrap().is_sent());

        let log = input.log.lock().unwrap().clone();
        assert_eq!(log.len(), 4);
        for pair in log.chunks(2) {
            let first = pair[0].trim_start_matches("begin:");
            let second = pair[1].trim_start_matches("end:");
            assert_eq!(first, second, "interleaved sends: {:?}", log);
        }
    }

    #[test]
    fn test_backoff_progression() {
        let s = ArbiterSettings::default();
        let mut b = s.initial_backoff;
        let mut seen = vec![b];
        for _ in 0..6 {
            b = s.next_backoff(b);
            seen.push(b);
        }
        assert_eq!(seen[0], Duration::from_millis(800));
        assert_eq!(seen[1], Duration::from_millis(1280));
        assert_eq!(*seen.last().unwrap(), Duration::from_secs(6));
    }
}
