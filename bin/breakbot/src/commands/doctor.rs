use breakbot_browser::find_browser_binary;
use breakbot_core::Paths;
use std::path::PathBuf;

use super::load_config;

/// Checks everything `breakbot run` needs before it can join a room.
pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = Paths::new();

    println!();
    println!("🩺 breakbot doctor");
    println!("================================");
    println!();

    let mut ok_count = 0u32;
    let mut warn_count = 0u32;
    let mut err_count = 0u32;

    // --- 1. Config ---
    println!("📋 Configuration");
    let file = config_path.clone().unwrap_or_else(|| paths.config_file());
    if file.exists() {
        print_ok("Config file", &file.display().to_string());
        ok_count += 1;
    } else {
        print_warn("No config file", "Defaults and environment variables will be used");
        warn_count += 1;
    }

    let config = match load_config(config_path.as_deref(), &paths) {
        Ok(c) => c,
        Err(e) => {
            print_err("Config could not be loaded", &e.to_string());
            println!();
            return Ok(());
        }
    };

    match config.validate() {
        Ok(()) => {
            print_ok("Room URL", &config.room.play_url);
            ok_count += 1;
        }
        Err(e) => {
            print_err("Config invalid", &e.to_string());
            err_count += 1;
        }
    }
    println!("  Bot name: {}", config.room.bot_name);
    println!(
        "  Scanning: {}",
        if config.scan.enabled { "enabled" } else { "disabled (API only)" }
    );
    println!();

    // --- 2. Browser ---
    println!("🌐 Browser");
    match find_browser_binary(config.browser.binary.as_deref()) {
        Some(path) => {
            print_ok("Chrome/Chromium found", &path);
            ok_count += 1;
        }
        None => {
            let hint = if config.browser.binary.is_some() {
                "browser.binary does not point to an executable"
            } else {
                "Install Google Chrome or Chromium, or set browser.binary"
            };
            print_err("No browser found", hint);
            err_count += 1;
        }
    }
    println!(
        "  Mode: {}",
        if config.browser.headed { "headed" } else { "headless" }
    );
    println!();

    // --- 3. Gateway ---
    println!("🔌 Gateway");
    println!("  Bind address: {}:{}", config.gateway.host, config.gateway.port);
    if config.gateway.host != "127.0.0.1" && config.gateway.host != "localhost" {
        print_warn(
            "API exposed beyond localhost",
            "The API has no authentication; anyone who can reach it can post to the room",
        );
        warn_count += 1;
    }
    println!();

    // --- Summary ---
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "  ✅ {} passed  ⚠️  {} warnings  ❌ {} errors",
        ok_count, warn_count, err_count
    );
    println!();
    if err_count > 0 {
        println!("  {} error(s) must be fixed before `breakbot run`.", err_count);
    } else {
        println!("  🎉 Ready to run.");
    }
    println!();

    Ok(())
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  ✅ {}", label);
    } else {
        println!("  ✅ {} — {}", label, detail);
    }
}

fn print_warn(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ⚠️  {}", label);
    } else {
        println!("  ⚠️  {} — {}", label, hint);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ❌ {}", label);
    } else {
        println!("  ❌ {} — {}", label, hint);
    }
}
