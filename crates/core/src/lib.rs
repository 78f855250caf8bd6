pub mod config;
pub mod error;
pub mod feed;
pub mod guard;
pub mod message;
pub mod paths;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use feed::{AttributionResolver, ChatFeed, ChatInput};
pub use guard::{RecentSender, TtlGuard};
pub use message::{looks_like_sender, ChatLine, FeedItem};
pub use paths::Paths;
