//! HTTP surface of the bot, shared by the binary and its integration tests.

pub mod api;

pub use api::{router, ApiState};
