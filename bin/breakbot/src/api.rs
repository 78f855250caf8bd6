use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use breakbot_agent::BreakBot;
use breakbot_core::config::GatewayConfig;
use breakbot_scheduler::{
    BreakInfo, BreakStart, MAX_BREAK_MINUTES, MIN_BREAK_MINUTES, UNKNOWN_REQUESTER,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

pub const NO_MATCH_REASON: &str = "no-match-or-ignored";

#[derive(Clone)]
pub struct ApiState {
    bot: Arc<BreakBot>,
    started: Instant,
}

impl ApiState {
    pub fn new(bot: Arc<BreakBot>) -> Self {
        Self {
            bot,
            started: Instant::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SayRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BreakRequest {
    minutes: i64,
    #[serde(default)]
    who: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Debug, Serialize)]
struct BreakResponse {
    ok: bool,
    started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct CommandResponse {
    ok: bool,
    #[serde(rename = "type")]
    kind: &'static str,
    minutes: u32,
    started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct RejectedResponse {
    ok: bool,
    reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
    active_timers: usize,
    scan_enabled: bool,
}

#[derive(Debug, Serialize)]
struct TimersResponse {
    timers: Vec<BreakInfo>,
}

/// Input the API refuses to act on. Rendered as 422 with the usual
/// `{ok, reason}` envelope.
#[derive(Debug)]
struct Invalid(String);

impl IntoResponse for Invalid {
    fn into_response(self) -> Response {
        debug!(reason = %self.0, "Rejected API request");
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(RejectedResponse {
                ok: false,
                reason: self.0,
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for Invalid {
    fn from(rejection: JsonRejection) -> Self {
        Invalid(rejection.body_text())
    }
}

fn require_text(text: &str) -> Result<&str, Invalid> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Invalid("text must not be empty".to_string()));
    }
    Ok(text)
}

fn break_fields(started: &BreakStart) -> (bool, Option<&'static str>) {
    match started {
        BreakStart::Started(_) => (true, None),
        BreakStart::Rejected(reason) => (false, Some(reason.reason())),
    }
}

async fn handle_say(
    State(state): State<ApiState>,
    body: Result<Json<SayRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, Invalid> {
    let Json(req) = body?;
    let text = require_text(&req.text)?;
    let outcome = state.bot.say(text).await;
    if !outcome.is_sent() {
        warn!(?outcome, "API say was not delivered");
    }
    Ok(Json(OkResponse { ok: true }))
}

async fn handle_break(
    State(state): State<ApiState>,
    body: Result<Json<BreakRequest>, JsonRejection>,
) -> Result<Json<BreakResponse>, Invalid> {
    let Json(req) = body?;
    let range = MIN_BREAK_MINUTES as i64..=MAX_BREAK_MINUTES as i64;
    if !range.contains(&req.minutes) {
        return Err(Invalid(format!(
            "minutes must be between {} and {}",
            MIN_BREAK_MINUTES, MAX_BREAK_MINUTES
        )));
    }
    let who = req
        .who
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .unwrap_or(UNKNOWN_REQUESTER);

    let started = state.bot.start_break(req.minutes, who).await;
    let (started, reason) = break_fields(&started);
    Ok(Json(BreakResponse {
        ok: true,
        started,
        reason,
    }))
}

async fn handle_command(
    State(state): State<ApiState>,
    body: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Response, Invalid> {
    let Json(req) = body?;
    let text = require_text(&req.text)?;

    let Some((minutes, started)) = state.bot.command(text).await else {
        return Ok(Json(RejectedResponse {
            ok: false,
            reason: NO_MATCH_REASON.to_string(),
        })
        .into_response());
    };
    let (started, reason) = break_fields(&started);
    Ok(Json(CommandResponse {
        ok: true,
        kind: "break",
        minutes,
        started,
        reason,
    })
    .into_response())
}

async fn handle_health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
        active_timers: state.bot.active_break_count(),
        scan_enabled: state.bot.scan_enabled(),
    })
}

async fn handle_timers(State(state): State<ApiState>) -> impl IntoResponse {
    Json(TimersResponse {
        timers: state.bot.active_breaks(),
    })
}

pub fn router(state: ApiState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/say", post(handle_say))
        .route("/break", post(handle_break))
        .route("/command", post(handle_command))
        .route("/health", get(handle_health))
        .route("/timers", get(handle_timers))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(gateway))
        .with_state(state)
}

/// Permissive unless origins are listed in `gateway.allowedOrigins`.
fn build_cors_layer(gateway: &GatewayConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = gateway
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive().allow_credentials(false);
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
