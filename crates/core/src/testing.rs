//! In-memory room used by tests of the engine crates.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::feed::{AttributionResolver, ChatFeed, ChatInput};
use crate::message::FeedItem;

#[derive(Default)]
pub struct MemoryFeed {
    items: Mutex<Vec<FeedItem>>,
    next_id: AtomicU64,
    sender_hints: Mutex<HashMap<String, String>>,
    broken: Mutex<HashSet<String>>,
    fetch_fails: AtomicBool,
}

impl MemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a bubble and returns its id.
    pub fn push(&self, text: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("b{}", n);
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let y = items.len() as f64 * 40.0;
        items.push(FeedItem {
            id: id.clone(),
            text: text.to_string(),
            y,
            consumed: false,
        });
        id
    }

    /// Makes the attribution resolver answer `name` for `item_id`.
    pub fn set_sender_hint(&self, item_id: &str, name: &str) {
        self.sender_hints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(item_id.to_string(), name.to_string());
    }

    /// Makes attribution lookups for `item_id` fail.
    pub fn break_item(&self, item_id: &str) {
        self.broken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(item_id.to_string());
    }

    pub fn set_fetch_fails(&self, fails: bool) {
        self.fetch_fails.store(fails, Ordering::SeqCst);
    }

    pub fn is_consumed(&self, item_id: &str) -> bool {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|i| i.id == item_id && i.consumed)
    }
}

#[async_trait]
impl ChatFeed for MemoryFeed {
    async fn fetch_items(&self) -> Result<Vec<FeedItem>> {
        if self.fetch_fails.load(Ordering::SeqCst) {
            return Err(Error::Feed("feed unavailable".to_string()));
        }
        Ok(self.items.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn mark_consumed(&self, item_id: &str) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        match items.iter_mut().find(|i| i.id == item_id) {
            Some(item) => {
                item.consumed = true;
                Ok(())
            }
            None => Err(Error::Feed(format!("unknown item {}", item_id))),
        }
    }

    async fn mark_all_consumed(&self) -> Result<usize> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        for item in items.iter_mut() {
            item.consumed = true;
        }
        Ok(items.len())
    }
}

#[async_trait]
impl AttributionResolver for MemoryFeed {
    async fn resolve_sender(&self, item_id: &str) -> Result<Option<String>> {
        if self
            .broken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(item_id)
        {
            return Err(Error::Feed(format!("item {} detached", item_id)));
        }
        Ok(self
            .sender_hints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(item_id)
            .cloned())
    }
}

/// Chat input that records every submitted text.
#[derive(Default)]
pub struct RecordingInput {
    sent: Mutex<Vec<String>>,
    rate_limited: AtomicBool,
    missing: AtomicBool,
}

impl RecordingInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate_limited(&self, limited: bool) {
        self.rate_limited.store(limited, Ordering::SeqCst);
    }

    pub fn set_missing(&self, missing: bool) {
        self.missing.store(missing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ChatInput for RecordingInput {
    async fn input_available(&self) -> Result<bool> {
        Ok(!self.missing.load(Ordering::SeqCst))
    }

    async fn rate_limited(&self) -> Result<bool> {
        Ok(self.rate_limited.load(Ordering::SeqCst))
    }

    async fn submit(&self, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }
}
