pub mod bot;
pub mod handler;
pub mod normalizer;
pub mod scanner;

pub use bot::{BreakBot, API_REQUESTER, GUIDANCE_MESSAGE};
pub use handler::{is_noise, is_return_notice, ChatHandler, Disposition};
pub use normalizer::normalize_command;
pub use scanner::{split_sender, FeedScanner};
