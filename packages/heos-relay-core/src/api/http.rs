//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use std::convert::Infallible;

use axum::{
    extract::{rejection::QueryRejection, FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{any, get},
    Json, Router,
};
use futures::Stream;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_success, command_ok, not_found};
use crate::api::sse::StreamSession;
use crate::api::AppState;
use crate::error::RelayResult;
use crate::protocol_constants::{SERVICE_ID, STREAM_PATH};
use crate::services::CommandRequest;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

/// Union of every command endpoint's query parameters. All are optional;
/// absent parameters are simply not forwarded.
///
/// A repeated key keeps its first value; unknown keys are ignored.
#[derive(Debug, Default)]
struct CommandParams {
    pid: Option<String>,
    level: Option<String>,
    sid: Option<String>,
    cid: Option<String>,
    mid: Option<String>,
    aid: Option<String>,
    start_item: Option<String>,
}

impl CommandParams {
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "pid" => &mut params.pid,
                "level" => &mut params.level,
                "sid" => &mut params.sid,
                "cid" => &mut params.cid,
                "mid" => &mut params.mid,
                "aid" => &mut params.aid,
                "startItem" => &mut params.start_item,
                _ => continue,
            };
            slot.get_or_insert(value);
        }
        params
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CommandParams {
    type Rejection = QueryRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state).await?;
        Ok(Self::from_pairs(pairs))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(STREAM_PATH, get(stream_events))
        .route("/next", any(play_next))
        .route("/previous", any(play_previous))
        .route("/play", any(play))
        .route("/pause", any(pause))
        .route("/set_volume", any(set_volume))
        .route("/browse/get_music_sources", any(get_music_sources))
        .route("/browse/get_source_info", any(get_source_info))
        .route("/browse/browse", any(browse))
        .route("/browse/add_to_queue", any(add_to_queue))
        .fallback(fallback)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness check: "Is the process running?"
///
/// Always returns 200 OK if the server is responding. Use `/ready` for
/// readiness checks that verify the upstream is connected.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "upstream": state.upstream.status(),
        "sessions": state.sessions.session_count(),
        "limits": {
            "maxSessions": state.sessions.max_sessions()
        }
    }))
}

/// Readiness check: 200 only while the upstream connection is live.
async fn readiness_check(State(state): State<AppState>) -> Response {
    let upstream = state.upstream.status();
    let ready = upstream.is_connected();
    let body = json!({
        "status": if ready { "ready" } else { "not_ready" },
        "ready": ready,
        "upstream": upstream,
    });

    if ready {
        api_success(body).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming
// ─────────────────────────────────────────────────────────────────────────────

async fn stream_events(
    State(state): State<AppState>,
) -> RelayResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let guard = state.sessions.register()?;
    let session = StreamSession::attach(guard, &state.hub, &state.dispatcher);
    log::info!(
        "[Session] Client attached as session {} (upstream {})",
        session.id(),
        state.upstream.status()
    );

    Ok(Sse::new(session.into_event_stream())
        .keep_alive(KeepAlive::new().interval(state.config.sse_keepalive())))
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

fn dispatch(state: &AppState, request: CommandRequest) -> RelayResult<impl IntoResponse> {
    state.dispatcher.dispatch_request(request)?;
    Ok(command_ok())
}

async fn play_next(
    State(state): State<AppState>,
    p: CommandParams,
) -> RelayResult<impl IntoResponse> {
    dispatch(&state, CommandRequest::PlayNext { pid: p.pid })
}

async fn play_previous(
    State(state): State<AppState>,
    p: CommandParams,
) -> RelayResult<impl IntoResponse> {
    dispatch(&state, CommandRequest::PlayPrevious { pid: p.pid })
}

async fn play(
    State(state): State<AppState>,
    p: CommandParams,
) -> RelayResult<impl IntoResponse> {
    dispatch(&state, CommandRequest::Play { pid: p.pid })
}

async fn pause(
    State(state): State<AppState>,
    p: CommandParams,
) -> RelayResult<impl IntoResponse> {
    dispatch(&state, CommandRequest::Pause { pid: p.pid })
}

async fn set_volume(
    State(state): State<AppState>,
    p: CommandParams,
) -> RelayResult<impl IntoResponse> {
    dispatch(
        &state,
        CommandRequest::SetVolume {
            pid: p.pid,
            level: p.level,
        },
    )
}

async fn get_music_sources(State(state): State<AppState>) -> RelayResult<impl IntoResponse> {
    dispatch(&state, CommandRequest::GetMusicSources)
}

async fn get_source_info(
    State(state): State<AppState>,
    p: CommandParams,
) -> RelayResult<impl IntoResponse> {
    dispatch(&state, CommandRequest::GetSourceInfo { sid: p.sid })
}

async fn browse(
    State(state): State<AppState>,
    p: CommandParams,
) -> RelayResult<impl IntoResponse> {
    dispatch(
        &state,
        CommandRequest::Browse {
            sid: p.sid,
            cid: p.cid,
            start_item: p.start_item,
        },
    )
}

async fn add_to_queue(
    State(state): State<AppState>,
    p: CommandParams,
) -> RelayResult<impl IntoResponse> {
    dispatch(
        &state,
        CommandRequest::AddToQueue {
            pid: p.pid,
            sid: p.sid,
            cid: p.cid,
            mid: p.mid,
            aid: p.aid,
        },
    )
}

async fn fallback() -> impl IntoResponse {
    not_found()
}
