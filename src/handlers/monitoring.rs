//! Live monitoring handlers
//!
//! REST snapshots plus a WebSocket that pushes periodic metrics and forwards
//! every broadcast from the connection registry.

use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    Json,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{AppState, AppResult};
use crate::middleware::auth::{authenticate, UserContext};
use crate::models::{Alert, AlertFilter, Log, LogFilter};
use crate::monitor::{LiveMetrics, MonitorMessage};

const RECENT_DEFAULT_LIMIT: i64 = 10;
const ACTIVITY_LIMIT: i64 = 5;

#[derive(Debug, Deserialize, Validate)]
pub struct RecentQuery {
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecentLogsResponse {
    pub logs: Vec<Log>,
}

#[derive(Debug, Serialize)]
pub struct RecentAlertsResponse {
    pub alerts: Vec<Alert>,
}

pub async fn metrics(
    State(state): State<AppState>,
    _user: UserContext,
) -> AppResult<Json<LiveMetrics>> {
    Ok(Json(LiveMetrics::collect(&state.pool).await?))
}

pub async fn recent_logs(
    State(state): State<AppState>,
    _user: UserContext,
    Query(query): Query<RecentQuery>,
) -> AppResult<Json<RecentLogsResponse>> {
    query.validate()?;
    let logs = recent_log_page(&state, query.limit.unwrap_or(RECENT_DEFAULT_LIMIT)).await?;
    Ok(Json(RecentLogsResponse { logs }))
}

pub async fn recent_alerts(
    State(state): State<AppState>,
    _user: UserContext,
    Query(query): Query<RecentQuery>,
) -> AppResult<Json<RecentAlertsResponse>> {
    query.validate()?;
    let alerts = recent_alert_page(&state, query.limit.unwrap_or(RECENT_DEFAULT_LIMIT)).await?;
    Ok(Json(RecentAlertsResponse { alerts }))
}

async fn recent_log_page(state: &AppState, limit: i64) -> Result<Vec<Log>, sqlx::Error> {
    let filter = LogFilter { limit: Some(limit), ..Default::default() };
    Log::list(&state.pool, &filter).await
}

async fn recent_alert_page(state: &AppState, limit: i64) -> Result<Vec<Alert>, sqlx::Error> {
    let filter = AlertFilter { limit: Some(limit), ..Default::default() };
    Alert::list(&state.pool, &filter).await
}

/// WebSocket endpoint; authenticates with the `token` query parameter
pub async fn ws(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| async move {
        let token = match query.token {
            Some(token) if !token.is_empty() => token,
            _ => return reject(socket, "Authentication required").await,
        };

        match authenticate(&state, &token).await {
            Ok(user) => run_session(socket, state, user).await,
            Err(e) => {
                tracing::debug!("Rejected monitoring connection: {:?}", e);
                reject(socket, "Invalid token").await
            }
        }
    })
}

async fn reject(mut socket: WebSocket, reason: &'static str) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!("Failed to send close frame: {}", e);
    }
}

type WsSink = SplitSink<WebSocket, Message>;

async fn send_message(sink: &mut WsSink, message: &MonitorMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    sink.send(Message::Text(text)).await
}

/// Metrics followed by the latest logs and alerts
async fn periodic_update(state: &AppState) -> Result<[MonitorMessage; 2], sqlx::Error> {
    let metrics = LiveMetrics::collect(&state.pool).await?;
    let logs = recent_log_page(state, ACTIVITY_LIMIT).await?;
    let alerts = recent_alert_page(state, ACTIVITY_LIMIT).await?;

    Ok([
        MonitorMessage::Metrics(metrics),
        MonitorMessage::RecentActivity { logs, alerts },
    ])
}

async fn run_session(socket: WebSocket, state: AppState, user: UserContext) {
    let (id, mut broadcasts) = state.connections.register().await;
    let (mut sink, mut stream) = socket.split();
    tracing::info!("Monitoring session {} opened for {}", id, user.email);

    let initial = match LiveMetrics::collect(&state.pool).await {
        Ok(metrics) => send_message(&mut sink, &MonitorMessage::Metrics(metrics)).await,
        Err(e) => {
            tracing::warn!("Failed to collect live metrics: {}", e);
            Ok(())
        }
    };

    if initial.is_ok() {
        let period = Duration::from_secs(state.config.monitor_interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let messages = match periodic_update(&state).await {
                        Ok(messages) => messages,
                        Err(e) => {
                            tracing::warn!("Failed to collect monitoring update: {}", e);
                            continue;
                        }
                    };
                    let mut sent = true;
                    for message in &messages {
                        if send_message(&mut sink, message).await.is_err() {
                            sent = false;
                            break;
                        }
                    }
                    if !sent {
                        break;
                    }
                }
                Some(message) = broadcasts.recv() => {
                    if send_message(&mut sink, &message).await.is_err() {
                        break;
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    state.connections.unregister(id).await;
    tracing::info!("Monitoring session {} closed", id);
}
