//! Maps chat text to a break length in minutes.
//!
//! Accepted families, tried in order:
//! - canonical: `#휴식 10`, `휴식 10`, `휴식 10분`
//! - short marker: `#10`
//! - natural: `10분 휴식하겠습니다`, `10분 쉬고 올게요`
//!
//! `#20분` and bare digits are deliberately rejected; both show up in ordinary
//! chat and used to start duplicate timers.

use once_cell::sync::Lazy;
use regex::Regex;

static CANONICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^#?\s*휴식\s*(\d+)\s*(?:분)?\s*$").unwrap());

static SHORT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*#\s*(\d{1,3})\s*$").unwrap());

static NATURAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(\d{1,3})\s*분\s*.*?(휴식|쉬)[가-힣\s\w]*$").unwrap());

/// Whether `text` is non-empty and made only of digits.
pub fn is_pure_digits(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Decimal value of one digit, accepting full-width forms typed through
/// CJK input methods.
fn digit_value(c: char) -> Option<u32> {
    match c {
        '０'..='９' => Some(c as u32 - '０' as u32),
        _ => c.to_digit(10),
    }
}

/// Reads a captured digit run, saturating at `u32::MAX` so oversized values
/// still clamp to the longest break.
fn parse_minutes(digits: &str) -> Option<u32> {
    digits.chars().try_fold(0u32, |acc, c| {
        let d = digit_value(c)?;
        Some(acc.saturating_mul(10).saturating_add(d))
    })
}

/// Returns the requested minutes, or `None` when `text` is not a break command.
/// The value is not clamped.
pub fn normalize_command(text: &str) -> Option<u32> {
    let s = text.trim();
    if is_pure_digits(s) {
        return None;
    }

    for pattern in [&*CANONICAL, &*SHORT_MARKER, &*NATURAL] {
        if let Some(caps) = pattern.captures(s) {
            return caps.get(1).and_then(|m| parse_minutes(m.as_str()));
        }
    }
    // `#20분` matches none of the above
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_family() {
        assert_eq!(normalize_command("#휴식 10"), Some(10));
        assert_eq!(normalize_command("휴식 10"), Some(10));
        assert_eq!(normalize_command("휴식 10분"), Some(10));
        assert_eq!(normalize_command("  # 휴식15분  "), Some(15));
        assert_eq!(normalize_command("휴식 300"), Some(300));
    }

    #[test]
    fn test_short_marker_family() {
        assert_eq!(normalize_command("#10"), Some(10));
        assert_eq!(normalize_command("# 5"), Some(5));
        assert_eq!(normalize_command("#1000"), None);
    }

    #[test]
    fn test_natural_family() {
        assert_eq!(normalize_command("10분 휴식하겠습니다"), Some(10));
        assert_eq!(normalize_command("20분 쉬고 올게요"), Some(20));
        assert_eq!(normalize_command("5분 잠깐 휴식"), Some(5));
        assert_eq!(normalize_command("10분-휴식"), Some(10));
    }

    #[test]
    fn test_rejected_families() {
        assert_eq!(normalize_command("#20분"), None);
        assert_eq!(normalize_command("# 20 분"), None);
        assert_eq!(normalize_command("10"), None);
        assert_eq!(normalize_command("  42 "), None);
        assert_eq!(normalize_command(""), None);
        assert_eq!(normalize_command("오늘 점심 뭐 먹지"), None);
        assert_eq!(normalize_command("10분 뒤에 봐요!"), None);
    }

    #[test]
    fn test_oversized_digits_saturate() {
        assert_eq!(normalize_command("#휴식 5000000000"), Some(u32::MAX));
        assert_eq!(normalize_command("휴식 99999999999999999999"), Some(u32::MAX));
        let minutes = normalize_command("#휴식 5000000000").unwrap_or(0);
        assert_eq!(breakbot_scheduler::clamp_minutes(minutes as i64), 180);
    }

    #[test]
    fn test_full_width_digits() {
        assert_eq!(normalize_command("#１０"), Some(10));
        assert_eq!(normalize_command("휴식 １０분"), Some(10));
        assert_eq!(normalize_command("２０분 쉬고 올게요"), Some(20));
    }

    #[test]
    fn test_guidance_examples_do_not_match() {
        assert_eq!(normalize_command("예) #휴식 OO분"), None);
        assert_eq!(normalize_command("예) OO분 휴식하겠습니다"), None);
    }
}
