use breakbot::{router, ApiState};
use breakbot_agent::BreakBot;
use breakbot_browser::ZepRoom;
use breakbot_core::Paths;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::load_config;

const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = load_config(config_path.as_deref(), &paths)?;
    config.validate()?;
    paths.ensure_dirs()?;

    let host = host.unwrap_or_else(|| config.gateway.host.clone());
    let port = port.unwrap_or(config.gateway.port);

    // ── Browser + room ──
    let room = Arc::new(ZepRoom::open(&config, &paths).await?);
    if let Err(e) = room.enter_as_guest().await {
        room.close().await;
        return Err(e.into());
    }

    let bot = Arc::new(BreakBot::new(
        &config,
        room.clone(),
        room.clone(),
        room.clone(),
    ));
    if let Err(e) = bot.bootstrap().await {
        room.close().await;
        return Err(e.into());
    }

    // ── Background tasks ──
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut handles: Vec<(&str, tokio::task::JoinHandle<()>)> = Vec::new();
    if let Some(handle) = bot.spawn_scanner(shutdown_tx.subscribe()) {
        handles.push(("scanner", handle));
    }

    // ── HTTP API ──
    let app = router(ApiState::new(bot.clone()), &config.gateway);
    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let http_shutdown_rx = shutdown_tx.subscribe();
    handles.push((
        "http_server",
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let mut rx = http_shutdown_rx;
                    let _ = rx.recv().await;
                })
                .await
                .ok();
        }),
    ));

    info!(
        addr = %bind_addr,
        room = %config.room.play_url,
        name = %config.room.bot_name,
        scan = config.scan.enabled,
        "breakbot is up"
    );

    // ── Wait for shutdown signal ──
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(());

    let deadline = tokio::time::Instant::now() + GRACEFUL_TIMEOUT;
    loop {
        if handles.iter().all(|(_, h)| h.is_finished()) {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    for (name, handle) in &handles {
        if !handle.is_finished() {
            warn!(task = *name, "Task did not exit in graceful window, aborting");
            handle.abort();
        }
    }
    for (name, handle) in handles {
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!(task = name, "Task cancelled during shutdown"),
            Err(e) => error!(task = name, error = %e, "Task panicked during shutdown"),
        }
    }

    let cancelled = bot.shutdown();
    let (sent, dropped) = bot.send_counters();
    info!(cancelled, sent, dropped, "Break timers cancelled");

    room.close().await;
    info!("breakbot stopped");
    Ok(())
}
