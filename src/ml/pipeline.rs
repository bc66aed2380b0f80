//! Inference pipeline - features, prediction, detection record, optional alert

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::features::{FeatureVector, InferenceInput};
use crate::config::Config;
use crate::models::{Alert, AlertSeverity, CreateAlert, MlDetection, NewDetection};
use crate::monitor::MonitorMessage;
use crate::{AppResult, AppState};

/// Alert source for ML-raised alerts
pub const ML_ALERT_SOURCE: &str = "ml_detection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionType {
    Malware,
    Intrusion,
    Anomaly,
    Unknown,
}

impl DetectionType {
    /// Classify a prediction label by keyword
    pub fn from_label(label: &str) -> Self {
        let label = label.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| label.contains(w));

        if has(&["malware", "virus"]) {
            Self::Malware
        } else if has(&["intrusion", "attack"]) {
            Self::Intrusion
        } else if has(&["anomaly", "suspicious"]) {
            Self::Anomaly
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Malware => "malware",
            Self::Intrusion => "intrusion",
            Self::Anomaly => "anomaly",
            Self::Unknown => "unknown",
        }
    }
}

/// Thresholds deciding whether a detection raises an alert
#[derive(Debug, Clone, Copy)]
pub struct AlertPolicy {
    pub threshold: f32,
    pub high_severity_threshold: f32,
}

impl AlertPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold: config.alert_threshold,
            high_severity_threshold: config.high_severity_threshold,
        }
    }

    /// Severity of the alert to raise, or `None` when no alert is due
    pub fn decide(&self, requested: bool, detection_type: DetectionType, confidence: f32) -> Option<AlertSeverity> {
        if !requested || detection_type == DetectionType::Unknown || confidence <= self.threshold {
            return None;
        }
        if confidence > self.high_severity_threshold {
            Some(AlertSeverity::High)
        } else {
            Some(AlertSeverity::Medium)
        }
    }
}

/// Per-request inference options
#[derive(Debug, Clone, Default)]
pub struct InferenceOptions {
    pub model_name: Option<String>,
    pub auto_create_alert: bool,
    pub related_log_id: Option<Uuid>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceOutcome {
    pub prediction: String,
    pub confidence: f64,
    pub detection_type: DetectionType,
    pub model_name: String,
    pub features: Value,
    pub detection_id: Uuid,
    pub alert_id: Option<Uuid>,
}

fn alert_for(
    detection_type: DetectionType,
    severity: AlertSeverity,
    prediction: &str,
    confidence: f32,
    model_name: &str,
    features: &Value,
) -> CreateAlert {
    CreateAlert {
        title: format!("ML Detection: {}", prediction),
        description: format!(
            "Machine learning model detected {} with {:.2}% confidence",
            detection_type.as_str(),
            confidence * 100.0
        ),
        severity,
        alert_type: detection_type.as_str().to_string(),
        source: Some(ML_ALERT_SOURCE.to_string()),
        metadata: Some(json!({
            "model_name": model_name,
            "confidence": confidence,
            "features": features,
        })),
        related_log_ids: None,
    }
}

/// Run a prediction, store the detection and raise an alert when due
pub async fn run_inference(
    state: &AppState,
    input: &InferenceInput,
    options: InferenceOptions,
) -> AppResult<InferenceOutcome> {
    let features = FeatureVector::extract(input);
    let (model_name, prediction) = state
        .models
        .predict(&features, options.model_name.as_deref())?;

    let detection_type = DetectionType::from_label(&prediction.label);
    let named_features = features.to_named();

    let detection = MlDetection::create(
        &state.pool,
        NewDetection {
            detection_type: detection_type.as_str().to_string(),
            confidence: f64::from(prediction.confidence),
            prediction: prediction.label.clone(),
            features: named_features.clone(),
            model_name: model_name.clone(),
            metadata: options.metadata.unwrap_or_else(|| json!({})),
            related_log_id: options.related_log_id,
        },
    )
    .await?;

    tracing::debug!(
        "Model {} predicted '{}' ({:.3}) for detection {}",
        model_name, prediction.label, prediction.confidence, detection.id
    );

    let policy = AlertPolicy::from_config(&state.config);
    let mut alert_id = None;
    if let Some(severity) = policy.decide(options.auto_create_alert, detection_type, prediction.confidence) {
        let mut data = alert_for(
            detection_type,
            severity,
            &prediction.label,
            prediction.confidence,
            &model_name,
            &named_features,
        );
        data.related_log_ids = options.related_log_id.map(|id| vec![id.to_string()]);

        let alert = Alert::create(&state.pool, data, None).await?;
        MlDetection::set_related_alert(&state.pool, detection.id, alert.id).await?;

        tracing::info!(
            "ML alert {} raised: {} ({})",
            alert.id, alert.title, alert.severity
        );
        alert_id = Some(alert.id);
        state.connections.broadcast(MonitorMessage::NewAlert(alert)).await;
    }

    Ok(InferenceOutcome {
        prediction: prediction.label,
        confidence: detection.confidence,
        detection_type,
        model_name,
        features: named_features,
        detection_id: detection.id,
        alert_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: AlertPolicy = AlertPolicy {
        threshold: 0.7,
        high_severity_threshold: 0.9,
    };

    #[test]
    fn test_detection_type_keywords() {
        assert_eq!(DetectionType::from_label("Trojan.Malware"), DetectionType::Malware);
        assert_eq!(DetectionType::from_label("VIRUS"), DetectionType::Malware);
        assert_eq!(DetectionType::from_label("brute_force_attack"), DetectionType::Intrusion);
        assert_eq!(DetectionType::from_label("intrusion"), DetectionType::Intrusion);
        assert_eq!(DetectionType::from_label("Suspicious login"), DetectionType::Anomaly);
        assert_eq!(DetectionType::from_label("benign"), DetectionType::Unknown);
    }

    #[test]
    fn test_malware_wins_over_later_keywords() {
        assert_eq!(DetectionType::from_label("suspicious malware attack"), DetectionType::Malware);
    }

    #[test]
    fn test_alert_decision() {
        assert_eq!(POLICY.decide(true, DetectionType::Intrusion, 0.95), Some(AlertSeverity::High));
        assert_eq!(POLICY.decide(true, DetectionType::Anomaly, 0.8), Some(AlertSeverity::Medium));
        assert_eq!(POLICY.decide(true, DetectionType::Anomaly, 0.9), Some(AlertSeverity::Medium));

        // Threshold is exclusive
        assert_eq!(POLICY.decide(true, DetectionType::Malware, 0.7), None);
        assert_eq!(POLICY.decide(false, DetectionType::Malware, 0.99), None);
        assert_eq!(POLICY.decide(true, DetectionType::Unknown, 0.99), None);
    }

    #[test]
    fn test_alert_content() {
        let features = json!({"severity_encoded": 3.0});
        let alert = alert_for(
            DetectionType::Intrusion,
            AlertSeverity::High,
            "intrusion",
            0.9312,
            "threat_detection",
            &features,
        );

        assert_eq!(alert.title, "ML Detection: intrusion");
        assert_eq!(
            alert.description,
            "Machine learning model detected intrusion with 93.12% confidence"
        );
        assert_eq!(alert.alert_type, "intrusion");
        assert_eq!(alert.source.as_deref(), Some(ML_ALERT_SOURCE));
        let metadata = alert.metadata.unwrap();
        assert_eq!(metadata["model_name"], "threat_detection");
        assert_eq!(metadata["features"], features);
    }
}
