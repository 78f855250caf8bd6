use serde::{Deserialize, Serialize};

/// Longest line (in characters) still accepted as a participant name.
pub const MAX_SENDER_CHARS: usize = 32;

/// One rendered chat bubble as seen by a feed poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    /// Stable handle for the lifetime of the rendered bubble.
    pub id: String,
    /// Raw text content, possibly multi-line (name line + message lines).
    pub text: String,
    /// Vertical screen position, used only as an ordering hint.
    #[serde(default)]
    pub y: f64,
    /// Whether the consumed-marker was already set on this bubble.
    #[serde(default)]
    pub consumed: bool,
}

/// A chat message after sender attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub sender: Option<String>,
    pub message: String,
}

impl ChatLine {
    pub fn new(sender: Option<&str>, message: &str) -> Self {
        Self {
            sender: sender.map(|s| s.to_string()),
            message: message.to_string(),
        }
    }
}

/// Whether a line of text plausibly is a participant name rather than a
/// message. Command-shaped lines are never names.
pub fn looks_like_sender(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty()
        && line.chars().count() <= MAX_SENDER_CHARS
        && !line.starts_with('#')
        && !line.contains('분')
        && !line.contains("휴식")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_sender() {
        assert!(looks_like_sender("철수"));
        assert!(looks_like_sender("  Alice Kim "));
        assert!(!looks_like_sender(""));
        assert!(!looks_like_sender("#휴식 10"));
        assert!(!looks_like_sender("10분 쉴게요"));
        assert!(!looks_like_sender("휴식 조교"));
        assert!(!looks_like_sender(&"가".repeat(MAX_SENDER_CHARS + 1)));
        assert!(looks_like_sender(&"가".repeat(MAX_SENDER_CHARS)));
    }
}
