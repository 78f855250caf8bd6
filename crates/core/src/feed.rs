//! Capabilities the bot needs from the external chat room.
//!
//! The engine only talks to these traits; the browser crate implements them
//! against a live ZEP page and tests implement them in memory.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::FeedItem;

/// Append-only, polled chat feed with a one-shot consumed-marker per item.
#[async_trait]
pub trait ChatFeed: Send + Sync {
    /// Current feed items in display order, consumed ones included.
    async fn fetch_items(&self) -> Result<Vec<FeedItem>>;

    /// Sets the consumed-marker on one item. Marking twice is a no-op.
    async fn mark_consumed(&self, item_id: &str) -> Result<()>;

    /// Marks every currently visible item consumed and returns how many were
    /// marked. Run once at startup so history is never acted upon.
    async fn mark_all_consumed(&self) -> Result<usize>;
}

/// Fallback sender lookup used when a bubble carries no name line.
#[async_trait]
pub trait AttributionResolver: Send + Sync {
    async fn resolve_sender(&self, item_id: &str) -> Result<Option<String>>;
}

/// Outbound chat control of the room.
#[async_trait]
pub trait ChatInput: Send + Sync {
    /// Whether the input control can currently be located.
    async fn input_available(&self) -> Result<bool>;

    /// Whether the room is showing its "slow down" indicator right now.
    async fn rate_limited(&self) -> Result<bool>;

    /// Clears the input, types `text` and submits it.
    async fn submit(&self, text: &str) -> Result<()>;
}
