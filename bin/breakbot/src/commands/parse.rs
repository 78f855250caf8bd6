use breakbot_agent::normalizer::is_pure_digits;
use breakbot_agent::{is_noise, is_return_notice, normalize_command, split_sender};
use breakbot_scheduler::clamp_minutes;

/// Prints how the bot would read `text`, without touching any room.
pub fn run(text: &str) -> anyhow::Result<()> {
    let line = split_sender(text.trim());
    let message = line.message.trim();

    println!();
    println!(
        "  Sender:  {}",
        line.sender.as_deref().unwrap_or("(unknown)")
    );
    println!("  Message: {}", message);
    println!("  Result:  {}", verdict(message));
    println!();
    Ok(())
}

/// Same checks, in the same order, as the live chat handler.
fn verdict(message: &str) -> String {
    if is_noise(message) {
        return "ignored (bot announcement or usage hint)".to_string();
    }
    if is_pure_digits(message) {
        return "ignored (digits only)".to_string();
    }
    if is_return_notice(message) {
        return "return notice (acknowledged)".to_string();
    }
    match normalize_command(message) {
        Some(minutes) => {
            let clamped = clamp_minutes(minutes as i64);
            if clamped == minutes {
                format!("break, {} minutes", minutes)
            } else {
                format!("break, {} minutes (asked for {})", clamped, minutes)
            }
        }
        None => "not a command".to_string(),
    }
}
