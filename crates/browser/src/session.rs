//! Chrome process launched with remote debugging and one attached page.

use breakbot_core::config::BrowserConfig;
use breakbot_core::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cdp::CdpClient;

const CDP_READY_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ChromeSession {
    pub debug_port: u16,
    pub user_data_dir: PathBuf,
    pub headed: bool,
    pub cdp: CdpClient,
    process: Mutex<Child>,
}

impl ChromeSession {
    pub async fn launch(config: &BrowserConfig, user_data_dir: PathBuf) -> Result<Self> {
        let binary = find_browser_binary(config.binary.as_deref()).ok_or_else(|| {
            Error::Browser(
                "Chrome/Chromium not found; install it or set browser.binary".to_string(),
            )
        })?;

        std::fs::create_dir_all(&user_data_dir)?;
        let debug_port = find_free_port().await?;
        let args = build_browser_args(debug_port, &user_data_dir, config.headed);

        info!(
            binary = %binary,
            port = debug_port,
            headed = config.headed,
            "Launching browser"
        );

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", binary, e)))?;

        wait_for_cdp_ready(debug_port, CDP_READY_TIMEOUT).await?;
        let page_ws_url = get_page_ws_url(debug_port).await?;
        let cdp = CdpClient::connect(&page_ws_url).await?;
        cdp.enable_domain("Page").await?;
        cdp.enable_domain("Runtime").await?;

        info!(ws_url = %page_ws_url, "CDP connection established");

        Ok(Self {
            debug_port,
            user_data_dir,
            headed: config.headed,
            cdp,
            process: Mutex::new(child),
        })
    }

    pub async fn close(&self) {
        if let Err(e) = self.cdp.close_browser().await {
            debug!(error = %e, "Browser.close failed (may already be closed)");
        }
        let _ = self.process.lock().await.kill().await;
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let _ = self.process.get_mut().start_kill();
    }
}

fn build_browser_args(debug_port: u16, user_data_dir: &Path, headed: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--password-store=basic".to_string(),
        "--autoplay-policy=no-user-gesture-required".to_string(),
    ];
    if !headed {
        args.push("--headless=new".to_string());
    }
    args.push("--window-size=1280,800".to_string());
    args.push("about:blank".to_string());
    args
}

/// Resolves the browser executable: the configured path first, then the
/// usual install locations and PATH.
pub fn find_browser_binary(configured: Option<&str>) -> Option<String> {
    if let Some(path) = configured.map(str::trim).filter(|p| !p.is_empty()) {
        if Path::new(path).exists() || which::which(path).is_ok() {
            return Some(path.to_string());
        }
        return None;
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
    } else {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Some(candidate.to_string());
        }
    }
    None
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Polls `/json/version` until the debugging endpoint answers.
async fn wait_for_cdp_ready(port: u16, timeout: Duration) -> Result<()> {
    let start = tokio::time::Instant::now();
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(Error::Timeout(format!(
                "Chrome CDP not ready after {}s on port {}",
                timeout.as_secs(),
                port
            )));
        }
        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if body.get("webSocketDebuggerUrl").is_some() {
                    return Ok(());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// WebSocket URL of the first page target. The target may appear a little
/// after the browser endpoint does.
async fn get_page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };
        let page = targets.iter().find_map(|t| {
            (t.get("type").and_then(|v| v.as_str()) == Some("page"))
                .then(|| t.get("webSocketDebuggerUrl").and_then(|v| v.as_str()))
                .flatten()
        });
        if let Some(ws_url) = page {
            return Ok(ws_url.to_string());
        }
    }

    Err(Error::Browser("No page target found after retries".to_string()))
}
