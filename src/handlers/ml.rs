//! ML inference and detection handlers

use std::path::Path as FsPath;

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::{AppState, AppError, AppResult};
use crate::middleware::auth::UserContext;
use crate::ml::pipeline::{run_inference, InferenceOptions};
use crate::ml::registry::{supported_extensions, validate_model_name, ModelInfo};
use crate::ml::{InferenceInput, InferenceOutcome, LayoutInfo, MlError};
use crate::models::{DetectionFilter, Log, MlDetection, SuricataEvent};

#[derive(Debug, Deserialize)]
pub struct InferenceRequest {
    pub data: Value,
    pub model_name: Option<String>,
    #[serde(default)]
    pub auto_create_alert: bool,
}

#[derive(Debug, Deserialize)]
pub struct InferenceQuery {
    pub model_name: Option<String>,
    #[serde(default)]
    pub auto_create_alert: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub model_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub default_model: Option<String>,
    pub feature_layout: LayoutInfo,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub message: String,
    pub model_name: String,
}

/// Run inference on ad-hoc data
pub async fn inference(
    State(state): State<AppState>,
    _user: UserContext,
    Json(req): Json<InferenceRequest>,
) -> AppResult<Json<InferenceOutcome>> {
    if !req.data.is_object() {
        return Err(MlError::InvalidInput("data must be a JSON object".to_string()).into());
    }
    let input = InferenceInput::from_json(req.data)
        .map_err(|e| MlError::InvalidInput(e.to_string()))?;

    let outcome = run_inference(
        &state,
        &input,
        InferenceOptions {
            model_name: req.model_name,
            auto_create_alert: req.auto_create_alert,
            ..Default::default()
        },
    )
    .await?;

    Ok(Json(outcome))
}

/// Run inference on a stored log
pub async fn inference_from_log(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
    Query(query): Query<InferenceQuery>,
) -> AppResult<Json<InferenceOutcome>> {
    let log = Log::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Log not found".to_string()))?;

    let outcome = run_inference(
        &state,
        &InferenceInput::from(&log),
        InferenceOptions {
            model_name: query.model_name,
            auto_create_alert: query.auto_create_alert,
            related_log_id: Some(log.id),
            metadata: None,
        },
    )
    .await?;

    Ok(Json(outcome))
}

/// Run inference on a stored Suricata event
pub async fn inference_from_suricata(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
    Query(query): Query<InferenceQuery>,
) -> AppResult<Json<InferenceOutcome>> {
    let event = SuricataEvent::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Suricata event not found".to_string()))?;

    let outcome = run_inference(
        &state,
        &InferenceInput::from(&event),
        InferenceOptions {
            model_name: query.model_name,
            auto_create_alert: query.auto_create_alert,
            related_log_id: None,
            metadata: Some(json!({ "suricata_event_id": event.id })),
        },
    )
    .await?;

    Ok(Json(outcome))
}

pub async fn list_detections(
    State(state): State<AppState>,
    _user: UserContext,
    Query(filter): Query<DetectionFilter>,
) -> AppResult<Json<Vec<MlDetection>>> {
    filter.validate()?;
    Ok(Json(MlDetection::list(&state.pool, &filter).await?))
}

pub async fn get_detection(
    State(state): State<AppState>,
    _user: UserContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MlDetection>> {
    let detection = MlDetection::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Detection not found".to_string()))?;

    Ok(Json(detection))
}

pub async fn list_models(
    State(state): State<AppState>,
    _user: UserContext,
) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.models.list(),
        default_model: state.models.default_model(),
        feature_layout: LayoutInfo::current(),
    })
}

/// Upload a model file and load it.
///
/// The name comes from the `model_name` query parameter, then a
/// `model_name` form field, then the uploaded file's stem.
pub async fn upload_model(
    State(state): State<AppState>,
    user: UserContext,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut field_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("model_name") => {
                field_name = Some(field.text().await.map_err(bad_multipart)?);
            }
            _ => {}
        }
    }

    let (file_name, bytes) = file
        .ok_or_else(|| AppError::ValidationError("Missing 'file' field".to_string()))?;
    let (stem, extension) = split_model_file_name(&file_name)?;
    let model_name = choose_model_name(query.model_name, field_name, stem);
    validate_model_name(&model_name)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let size = bytes.len();
    let registry = state.models.clone();
    let name = model_name.clone();
    let installed = tokio::task::spawn_blocking(move || registry.install_model(&name, extension, &bytes))
        .await
        .map_err(|e| AppError::InternalError(format!("Model upload task failed: {}", e)))?;

    match installed {
        Ok(_) => {}
        Err(MlError::Io(e)) => {
            return Err(AppError::InternalError(format!("Failed to save model: {}", e)));
        }
        Err(e) => return Err(AppError::ValidationError(format!("Failed to load model: {}", e))),
    }

    tracing::info!("Model {} uploaded by {} ({} bytes)", model_name, user.email, size);

    Ok(Json(UploadResponse {
        status: "success",
        message: format!("Model {} uploaded and loaded successfully", model_name),
        model_name,
    }))
}

/// First non-blank of query parameter, form field, file stem
fn choose_model_name(query: Option<String>, field: Option<String>, stem: String) -> String {
    [query, field]
        .into_iter()
        .flatten()
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .unwrap_or(stem)
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::ValidationError(format!("Invalid multipart body: {}", err))
}

/// Split an uploaded file name into stem and a supported extension
fn split_model_file_name(file_name: &str) -> AppResult<(String, &'static str)> {
    let path = FsPath::new(file_name);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let supported = supported_extensions();
    let extension = supported
        .iter()
        .copied()
        .find(|ext| *ext == extension)
        .ok_or_else(|| {
            let allowed: Vec<String> = supported.iter().map(|e| format!(".{}", e)).collect();
            AppError::ValidationError(format!("Only {} files are supported", allowed.join(" and ")))
        })?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    Ok((stem, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_model_file_name() {
        let (stem, ext) = split_model_file_name("threat_v2.JSON").unwrap();
        assert_eq!(stem, "threat_v2");
        assert_eq!(ext, "json");

        assert!(split_model_file_name("model.pkl").is_err());
        assert!(split_model_file_name("model").is_err());
    }

    #[test]
    fn test_query_model_name_wins() {
        let name = choose_model_name(Some("from_query".into()), Some("from_form".into()), "stem".into());
        assert_eq!(name, "from_query");

        let name = choose_model_name(Some("  ".into()), Some(" from_form ".into()), "stem".into());
        assert_eq!(name, "from_form");

        assert_eq!(choose_model_name(None, None, "threat_v2".into()), "threat_v2");
    }

    #[test]
    fn test_upload_query_parses_model_name() {
        let query: UploadQuery = serde_json::from_value(json!({"model_name": "edge"})).unwrap();
        assert_eq!(query.model_name.as_deref(), Some("edge"));
        assert!(UploadQuery::default().model_name.is_none());
    }

    #[test]
    fn test_inference_request_defaults() {
        let req: InferenceRequest = serde_json::from_value(json!({
            "data": {"severity": "error"}
        }))
        .unwrap();
        assert!(!req.auto_create_alert);
        assert!(req.model_name.is_none());
    }
}
