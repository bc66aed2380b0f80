//! Log handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppError, AppResult};
use crate::middleware::auth::UserContext;
use crate::models::{CreateLog, Log, LogFilter};
use crate::monitor::MonitorMessage;

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// Create a log entry and push it to monitoring clients
pub async fn create(
    State(state): State<AppState>,
    user: UserContext,
    Json(req): Json<CreateLog>,
) -> AppResult<(StatusCode, Json<Log>)> {
    req.validate()?;

    let log = Log::create(&state.pool, req, Some(user.user_id)).await?;
    tracing::debug!("Log {} created from {}", log.id, log.source);

    state.connections.broadcast(MonitorMessage::NewLog(log.clone())).await;

    Ok((StatusCode::CREATED, Json(log)))
}

pub async fn list(
    State(state): State<AppState>,
    _user: UserContext,
    Query(filter): Query<LogFilter>,
) -> AppResult<Json<Vec<Log>>> {
    filter.validate()?;
    let logs = Log::list(&state.pool, &filter).await?;
    Ok(Json(logs))
}

pub async fn get(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Log>> {
    let log = Log::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Log not found".to_string()))?;

    Ok(Json(log))
}

pub async fn count(
    State(state): State<AppState>,
    _user: UserContext,
    Query(filter): Query<LogFilter>,
) -> AppResult<Json<CountResponse>> {
    let count = Log::count(&state.pool, &filter).await?;
    Ok(Json(CountResponse { count }))
}
