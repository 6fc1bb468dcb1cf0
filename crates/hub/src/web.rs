use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::coordinator::Coordinator;
use crate::db::{ScheduleEntry, ScheduleInput, SchedulePatch, SensorReadingRecord, WateringKind, WateringLogRecord};
use crate::hub::{SubscriberId, Subscription};
use crate::protocol::{encode_event, parse_command, Command, Event, Notification};
use crate::scheduler;
use crate::state::SystemStatus;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            ApiError::Store(e) => {
                let error_id = uuid::Uuid::new_v4();
                error!(%error_id, "store error: {e:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("internal error ({error_id})"),
                )
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(coordinator: Coordinator) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/api/status", get(api_status))
        .route("/api/schedules", get(list_schedules).post(create_schedule))
        .route(
            "/api/schedules/{id}",
            axum::routing::put(update_schedule).delete(delete_schedule),
        )
        .route("/api/logs", get(recent_logs))
        .route("/api/readings", get(recent_readings))
        .route("/api/readings/latest", get(latest_reading))
        .route("/api/ws-test", get(ws_test))
        .with_state(coordinator)
}

async fn api_status(State(c): State<Coordinator>) -> Json<SystemStatus> {
    Json(c.status().await)
}

async fn list_schedules(State(c): State<Coordinator>) -> ApiResult<Vec<ScheduleEntry>> {
    Ok(Json(c.db().list_schedules().await?))
}

async fn create_schedule(
    State(c): State<Coordinator>,
    body: Result<Json<ScheduleInput>, JsonRejection>,
) -> ApiResult<ScheduleEntry> {
    let Json(input) = body?;
    reject_invalid(scheduler::field_errors(Some(&input.time), Some(input.duration)))?;

    let entry = c.db().create_schedule(&input).await?;
    info!(id = %entry.id, time = %entry.time, "schedule created");
    Ok(Json(entry))
}

async fn update_schedule(
    State(c): State<Coordinator>,
    Path(id): Path<String>,
    body: Result<Json<SchedulePatch>, JsonRejection>,
) -> ApiResult<ScheduleEntry> {
    let Json(patch) = body?;
    reject_invalid(scheduler::field_errors(patch.time.as_deref(), patch.duration))?;

    let entry = c
        .db()
        .update_schedule(&id, &patch)
        .await?
        .ok_or(ApiError::NotFound("schedule"))?;
    info!(id = %entry.id, "schedule updated");
    Ok(Json(entry))
}

async fn delete_schedule(
    State(c): State<Coordinator>,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    if !c.db().delete_schedule(&id).await? {
        return Err(ApiError::NotFound("schedule"));
    }
    info!(%id, "schedule deleted");
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

impl LimitQuery {
    fn resolve(&self, default: i64) -> Result<i64, ApiError> {
        match self.limit {
            None => Ok(default),
            Some(n) if n > 0 => Ok(n),
            Some(n) => Err(ApiError::BadRequest(format!("limit must be positive, got {n}"))),
        }
    }
}

async fn recent_logs(
    State(c): State<Coordinator>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<WateringLogRecord>> {
    let limit = q.resolve(c.log_limit())?;
    Ok(Json(c.db().recent_logs(limit).await?))
}

async fn recent_readings(
    State(c): State<Coordinator>,
    Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<SensorReadingRecord>> {
    let limit = q.resolve(c.reading_limit())?;
    Ok(Json(c.db().recent_readings(limit).await?))
}

async fn latest_reading(State(c): State<Coordinator>) -> ApiResult<SensorReadingRecord> {
    let reading = c
        .db()
        .latest_reading()
        .await?
        .ok_or(ApiError::NotFound("sensor reading"))?;
    Ok(Json(reading))
}

/// Socket diagnostics for clients that cannot connect.
async fn ws_test(State(c): State<Coordinator>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "WebSocket server is configured",
        "path": "/ws",
        "clients": c.subscriber_count().await,
        "readyState": "ready",
    }))
}

fn reject_invalid(errors: Vec<String>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(errors.join("; ")))
    }
}

// ---------------------------------------------------------------------------
// Viewer socket
// ---------------------------------------------------------------------------

async fn ws_upgrade(ws: WebSocketUpgrade, State(c): State<Coordinator>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, c))
}

async fn handle_socket(socket: WebSocket, coordinator: Coordinator) {
    let subscription = coordinator.subscribe().await;
    let (sink, stream) = socket.split();
    serve_viewer(coordinator, subscription, sink, stream).await;
}

/// Pump events out to one viewer and its commands in, until either side
/// ends.  A viewer the hub has dropped gets a close frame so it reconnects
/// and receives a fresh snapshot.
async fn serve_viewer<S, R, E>(coordinator: Coordinator, subscription: Subscription, mut sink: S, mut stream: R)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let Subscription { id, mut events } = subscription;
    info!(viewer = id, "viewer connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    warn!(viewer = id, "viewer dropped by hub, closing socket");
                    let frame = CloseFrame {
                        code: close_code::AGAIN,
                        reason: Utf8Bytes::from_static("viewer fell behind"),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                };
                let text = match encode_event(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(viewer = id, "event encode failed: {e}");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch(&coordinator, id, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(viewer = id, "socket error: {e}");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    coordinator.unsubscribe(id).await;
    info!(viewer = id, "viewer disconnected");
}

/// Apply one inbound text frame from `viewer`.  Failures are answered with an
/// error notification to that viewer only.
pub(crate) async fn dispatch(coordinator: &Coordinator, viewer: SubscriberId, text: &str) {
    let command = match parse_command(text) {
        Ok(command) => command,
        Err(e) => {
            warn!(viewer, "{e}");
            let notice = Notification::error("Invalid message", e);
            coordinator.reply(viewer, Event::Notification(notice)).await;
            return;
        }
    };

    let result = match command {
        Command::StartWatering => coordinator.start_watering(WateringKind::Manual).await,
        Command::StopWatering => coordinator.stop_watering().await,
        Command::GetStatus => {
            coordinator.reply_status(viewer).await;
            return;
        }
    };

    if let Err(e) = result {
        error!(viewer, ?command, "command failed: {e}");
        let notice = Notification::error("Watering error", e.to_string());
        coordinator.reply(viewer, Event::Notification(notice)).await;
    }
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(coordinator: Coordinator, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "web listening");

    axum::serve(listener, router(coordinator))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
