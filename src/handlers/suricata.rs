//! Suricata integration handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppError, AppResult};
use crate::middleware::auth::UserContext;
use crate::models::suricata::{suricata_log_severity, EveAlert};
use crate::models::{
    CreateLog, CreateSuricataConfig, CreateSuricataRule, Log, LogSeverity, SuricataConfig,
    SuricataEvent, SuricataEventFilter, SuricataRule, UpdateSuricataRule,
};
use crate::monitor::MonitorMessage;

#[derive(Debug, Deserialize)]
pub struct RuleListQuery {
    #[serde(default)]
    pub enabled_only: bool,
}

#[derive(Debug, Serialize)]
pub struct BatchError {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub processed: usize,
    pub errors: usize,
    pub results: Vec<SuricataEvent>,
    pub error_details: Vec<BatchError>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Store an EVE record; `alert` records also produce a log entry
async fn ingest_event(state: &AppState, raw: Value) -> AppResult<SuricataEvent> {
    if !raw.is_object() {
        return Err(AppError::ValidationError(
            "Failed to process Suricata event: expected a JSON object".to_string(),
        ));
    }

    let event = SuricataEvent::create(&state.pool, raw).await?;

    if event.event_type == "alert" {
        let alert = EveAlert::from_raw(&event.raw_event).unwrap_or_else(|| EveAlert {
            signature: "Unknown signature".to_string(),
            category: None,
            severity: 1,
            raw: json!({}),
        });
        let severity = suricata_log_severity(alert.severity);

        let entry = CreateLog::system("suricata", "alert", severity, format!("Suricata Alert: {}", alert.signature))
            .with_timestamp(event.timestamp)
            .with_metadata(json!({
                "suricata_event_id": event.id,
                "signature": alert.signature,
                "category": alert.category.as_deref().unwrap_or("Unknown"),
                "severity": alert.severity,
                "raw_alert": alert.raw,
            }));

        let log = Log::create(&state.pool, entry, None).await?;
        state.connections.broadcast(MonitorMessage::NewLog(log)).await;
    }

    Ok(event)
}

pub async fn ingest(
    State(state): State<AppState>,
    _user: UserContext,
    Json(raw): Json<Value>,
) -> AppResult<(StatusCode, Json<SuricataEvent>)> {
    let event = ingest_event(&state, raw).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Ingest several events; failures are reported per index
pub async fn ingest_batch(
    State(state): State<AppState>,
    _user: UserContext,
    Json(events): Json<Vec<Value>>,
) -> AppResult<(StatusCode, Json<BatchResponse>)> {
    let mut results = Vec::with_capacity(events.len());
    let mut error_details = Vec::new();

    for (index, raw) in events.into_iter().enumerate() {
        match ingest_event(&state, raw).await {
            Ok(event) => results.push(event),
            Err(e) => {
                tracing::warn!("Suricata batch item {} failed: {:?}", index, e);
                error_details.push(BatchError { index, error: batch_error_message(&e) });
            }
        }
    }

    tracing::info!("Suricata batch: {} stored, {} failed", results.len(), error_details.len());

    Ok((
        StatusCode::CREATED,
        Json(BatchResponse {
            processed: results.len(),
            errors: error_details.len(),
            results,
            error_details,
        }),
    ))
}

fn batch_error_message(err: &AppError) -> String {
    match err {
        AppError::ValidationError(msg) => msg.clone(),
        AppError::DatabaseError(_) => "Database error occurred".to_string(),
        _ => "Internal server error".to_string(),
    }
}

pub async fn list_events(
    State(state): State<AppState>,
    _user: UserContext,
    Query(filter): Query<SuricataEventFilter>,
) -> AppResult<Json<Vec<SuricataEvent>>> {
    filter.validate()?;
    Ok(Json(SuricataEvent::list(&state.pool, &filter).await?))
}

pub async fn create_rule(
    State(state): State<AppState>,
    _user: UserContext,
    Json(req): Json<CreateSuricataRule>,
) -> AppResult<(StatusCode, Json<SuricataRule>)> {
    req.validate()?;
    let rule = SuricataRule::create(&state.pool, &req).await?;
    tracing::info!("Suricata rule created: {} ({})", rule.name, rule.id);
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn list_rules(
    State(state): State<AppState>,
    _user: UserContext,
    Query(query): Query<RuleListQuery>,
) -> AppResult<Json<Vec<SuricataRule>>> {
    Ok(Json(SuricataRule::list(&state.pool, query.enabled_only).await?))
}

pub async fn update_rule(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSuricataRule>,
) -> AppResult<Json<SuricataRule>> {
    req.validate()?;
    let rule = SuricataRule::update(&state.pool, id, &req)
        .await?
        .ok_or_else(|| AppError::NotFound("Rule not found".to_string()))?;
    Ok(Json(rule))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<StatusResponse>> {
    if !SuricataRule::delete(&state.pool, id).await? {
        return Err(AppError::NotFound("Rule not found".to_string()));
    }

    tracing::info!("Suricata rule deleted: {}", id);
    Ok(Json(StatusResponse {
        status: "success",
        message: "Rule deleted".to_string(),
        timestamp: None,
    }))
}

pub async fn create_config(
    State(state): State<AppState>,
    _user: UserContext,
    Json(req): Json<CreateSuricataConfig>,
) -> AppResult<(StatusCode, Json<SuricataConfig>)> {
    req.validate()?;
    let config = SuricataConfig::create(&state.pool, &req).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn list_configs(
    State(state): State<AppState>,
    _user: UserContext,
) -> AppResult<Json<Vec<SuricataConfig>>> {
    Ok(Json(SuricataConfig::list(&state.pool).await?))
}

/// Record a rule reload request
pub async fn reload(
    State(state): State<AppState>,
    user: UserContext,
) -> AppResult<Json<StatusResponse>> {
    let entry = CreateLog::system("suricata", "reload", LogSeverity::Info, "Suricata reload triggered")
        .with_metadata(json!({ "action": "reload_rules" }));
    let log = Log::create(&state.pool, entry, Some(user.user_id)).await?;

    tracing::info!("Suricata reload triggered by {}", user.email);

    Ok(Json(StatusResponse {
        status: "success",
        message: "Suricata reload triggered".to_string(),
        timestamp: Some(log.timestamp),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_error_hides_internal_details() {
        let db = AppError::DatabaseError("connection refused at 10.0.0.3".into());
        assert_eq!(batch_error_message(&db), "Database error occurred");

        let invalid = AppError::ValidationError("expected a JSON object".into());
        assert_eq!(batch_error_message(&invalid), "expected a JSON object");
    }

    #[test]
    fn test_status_response_omits_missing_timestamp() {
        let json = serde_json::to_value(StatusResponse {
            status: "success",
            message: "Rule deleted".into(),
            timestamp: None,
        })
        .unwrap();
        assert!(json.get("timestamp").is_none());
    }
}
