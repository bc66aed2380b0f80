//! Alert handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppError, AppResult};
use crate::handlers::logs::CountResponse;
use crate::middleware::auth::UserContext;
use crate::models::{Alert, AlertFilter, CreateAlert, UpdateAlert};
use crate::monitor::MonitorMessage;

pub async fn create(
    State(state): State<AppState>,
    user: UserContext,
    Json(req): Json<CreateAlert>,
) -> AppResult<(StatusCode, Json<Alert>)> {
    req.validate()?;

    let alert = Alert::create(&state.pool, req, Some(user.user_id)).await?;
    tracing::info!("Alert created: {} [{}] by {}", alert.title, alert.severity, user.email);

    state.connections.broadcast(MonitorMessage::NewAlert(alert.clone())).await;

    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn list(
    State(state): State<AppState>,
    _user: UserContext,
    Query(filter): Query<AlertFilter>,
) -> AppResult<Json<Vec<Alert>>> {
    filter.validate()?;
    let alerts = Alert::list(&state.pool, &filter).await?;
    Ok(Json(alerts))
}

pub async fn get(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Alert>> {
    let alert = Alert::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))?;

    Ok(Json(alert))
}

/// Update status, notes or assignee
pub async fn update(
    State(state): State<AppState>,
    user: UserContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAlert>,
) -> AppResult<Json<Alert>> {
    req.validate()?;
    if req.is_empty() {
        return Err(AppError::ValidationError("No fields to update".to_string()));
    }

    let alert = Alert::update(&state.pool, id, &req)
        .await?
        .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))?;

    tracing::info!("Alert {} updated by {} (status: {})", alert.id, user.email, alert.status);
    state.connections.broadcast(MonitorMessage::AlertUpdated(alert.clone())).await;

    Ok(Json(alert))
}

pub async fn count(
    State(state): State<AppState>,
    _user: UserContext,
    Query(filter): Query<AlertFilter>,
) -> AppResult<Json<CountResponse>> {
    let count = Alert::count(&state.pool, &filter).await?;
    Ok(Json(CountResponse { count }))
}
