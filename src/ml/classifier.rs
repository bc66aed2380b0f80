//! Classifiers - pre-trained models behind a common predict interface

use serde::{Deserialize, Serialize};

use super::features::{FeatureVector, FEATURE_COUNT};
use super::MlError;

/// Top class reported by a classifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    /// Probability of `label`, in 0.0 - 1.0
    pub confidence: f32,
}

/// Trait for loaded models (JSON linear models, ONNX graphs)
pub trait Classifier: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, MlError>;

    /// Backend name for status output
    fn kind(&self) -> &'static str;
}

// ============================================================================
// LINEAR MODEL
// ============================================================================

/// Linear model exported from a training pipeline as JSON.
///
/// One weight row per class gives a multinomial model (softmax over the
/// class scores). A single row is a binary model whose score is the
/// log-odds of `classes[1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearClassifier {
    pub classes: Vec<String>,
    pub weights: Vec<Vec<f32>>,
    pub intercepts: Vec<f32>,
    /// False for margin-only models (no calibrated probabilities)
    #[serde(default = "default_true")]
    pub probabilistic: bool,
}

fn default_true() -> bool {
    true
}

impl LinearClassifier {
    /// Deserialize and validate a model file's contents
    pub fn from_json(name: &str, raw: &str) -> Result<Self, MlError> {
        let model: Self = serde_json::from_str(raw).map_err(|e| MlError::ModelLoad {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        model.validate(name)?;
        Ok(model)
    }

    fn validate(&self, name: &str) -> Result<(), MlError> {
        let load_err = |reason: String| MlError::ModelLoad {
            name: name.to_string(),
            reason,
        };

        if self.weights.is_empty() {
            return Err(load_err("model has no weights".to_string()));
        }
        if self.weights.len() != self.intercepts.len() {
            return Err(load_err(format!(
                "{} weight rows but {} intercepts",
                self.weights.len(),
                self.intercepts.len()
            )));
        }

        let expected_classes = if self.weights.len() == 1 { 2 } else { self.weights.len() };
        if self.classes.len() != expected_classes {
            return Err(load_err(format!(
                "expected {} classes, found {}",
                expected_classes,
                self.classes.len()
            )));
        }

        if let Some(row) = self.weights.iter().find(|row| row.len() != FEATURE_COUNT) {
            return Err(MlError::LayoutMismatch {
                expected: FEATURE_COUNT,
                actual: row.len(),
            });
        }
        Ok(())
    }

    /// Class scores, accumulated in f64 so large feature values cannot overflow
    fn scores(&self, values: &[f32; FEATURE_COUNT]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.intercepts)
            .map(|(row, bias)| {
                row.iter()
                    .zip(values)
                    .map(|(w, x)| f64::from(*w) * f64::from(*x))
                    .sum::<f64>()
                    + f64::from(*bias)
            })
            .collect()
    }
}

impl Classifier for LinearClassifier {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, MlError> {
        let scores = self.scores(&features.to_vector());

        let (index, confidence) = if scores.len() == 1 {
            let p = sigmoid(scores[0]);
            let positive = p >= 0.5;
            // Margin-only models report sigmoid(decision), even for the negative class
            let confidence = if !self.probabilistic || positive {
                p
            } else {
                1.0 - p
            };
            (usize::from(positive), confidence)
        } else {
            let (index, best) = argmax(&scores)
                .ok_or_else(|| MlError::Inference("empty score vector".to_string()))?;
            let confidence = if self.probabilistic {
                softmax(&scores)[index]
            } else {
                sigmoid(best)
            };
            (index, confidence)
        };

        if !confidence.is_finite() {
            return Err(MlError::Inference(format!(
                "model produced a non-finite confidence ({})",
                confidence
            )));
        }

        Ok(Prediction {
            label: self.classes[index].clone(),
            confidence: confidence.clamp(0.0, 1.0) as f32,
        })
    }

    fn kind(&self) -> &'static str {
        "linear"
    }
}

// ============================================================================
// HELPERS
// ============================================================================

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub(crate) fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

pub(crate) fn argmax(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(index: usize, value: f32) -> Vec<f32> {
        let mut row = vec![0.0; FEATURE_COUNT];
        row[index] = value;
        row
    }

    fn critical_features() -> FeatureVector {
        FeatureVector {
            severity_encoded: 3.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_multiclass_softmax() {
        let model = LinearClassifier {
            classes: vec!["benign".into(), "intrusion".into(), "malware".into()],
            weights: vec![row(0, -1.0), row(0, 2.0), row(0, 0.5)],
            intercepts: vec![1.0, 0.0, 0.0],
            probabilistic: true,
        };

        let prediction = model.predict(&critical_features()).unwrap();
        assert_eq!(prediction.label, "intrusion");

        let probs = softmax(&model.scores(&critical_features().to_vector()));
        let total: f64 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((prediction.confidence - probs[1] as f32).abs() < 1e-6);
    }

    #[test]
    fn test_binary_model() {
        let model = LinearClassifier {
            classes: vec!["normal".into(), "attack".into()],
            weights: vec![row(0, 1.5)],
            intercepts: vec![-2.0],
            probabilistic: true,
        };

        let attack = model.predict(&critical_features()).unwrap();
        assert_eq!(attack.label, "attack");
        assert!((attack.confidence - sigmoid(2.5) as f32).abs() < 1e-6);

        let normal = model.predict(&FeatureVector::default()).unwrap();
        assert_eq!(normal.label, "normal");
        assert!((normal.confidence - (1.0 - sigmoid(-2.0)) as f32).abs() < 1e-6);
    }

    #[test]
    fn test_margin_model_uses_sigmoid_of_decision() {
        let model = LinearClassifier {
            classes: vec!["benign".into(), "anomaly".into()],
            weights: vec![row(0, 0.0), row(0, 1.0)],
            intercepts: vec![0.0, 0.0],
            probabilistic: false,
        };

        let prediction = model.predict(&critical_features()).unwrap();
        assert_eq!(prediction.label, "anomaly");
        assert!((prediction.confidence - sigmoid(3.0) as f32).abs() < 1e-6);
    }

    #[test]
    fn test_binary_margin_model_reports_raw_decision() {
        let model = LinearClassifier {
            classes: vec!["benign".into(), "anomaly".into()],
            weights: vec![row(0, 1.0)],
            intercepts: vec![-5.0],
            probabilistic: false,
        };

        // decision = 3 - 5 = -2: negative class, confidence below one half
        let prediction = model.predict(&critical_features()).unwrap();
        assert_eq!(prediction.label, "benign");
        assert!((prediction.confidence - sigmoid(-2.0) as f32).abs() < 1e-6);
        assert!(prediction.confidence < 0.5);
    }

    #[test]
    fn test_saturated_features_keep_confidence_finite() {
        let model = LinearClassifier {
            classes: vec!["benign".into(), "intrusion".into()],
            weights: vec![row(14, 2.0)],
            intercepts: vec![-3.0],
            probabilistic: true,
        };
        let features = FeatureVector {
            bytes_sent: f32::MAX,
            ..Default::default()
        };

        let prediction = model.predict(&features).unwrap();
        assert_eq!(prediction.label, "intrusion");
        assert!(prediction.confidence.is_finite());
        assert!((0.0..=1.0).contains(&prediction.confidence));
    }

    #[test]
    fn test_non_finite_features_fail_inference() {
        let model = LinearClassifier {
            classes: vec!["benign".into(), "intrusion".into()],
            weights: vec![row(14, 0.0)],
            intercepts: vec![0.0],
            probabilistic: true,
        };
        let features = FeatureVector {
            bytes_sent: f32::INFINITY,
            ..Default::default()
        };

        // 0 * inf is NaN
        assert!(matches!(model.predict(&features), Err(MlError::Inference(_))));
    }

    #[test]
    fn test_from_json_rejects_wrong_width() {
        let raw = json!({
            "classes": ["a", "b"],
            "weights": [[1.0, 2.0]],
            "intercepts": [0.0]
        })
        .to_string();

        let err = LinearClassifier::from_json("tiny", &raw).unwrap_err();
        assert!(matches!(err, MlError::LayoutMismatch { expected: FEATURE_COUNT, actual: 2 }));
    }

    #[test]
    fn test_from_json_rejects_class_mismatch() {
        let raw = json!({
            "classes": ["only"],
            "weights": [vec![0.0; FEATURE_COUNT]],
            "intercepts": [0.0]
        })
        .to_string();

        assert!(matches!(
            LinearClassifier::from_json("broken", &raw),
            Err(MlError::ModelLoad { .. })
        ));
    }

    #[test]
    fn test_argmax_prefers_first_on_tie() {
        assert_eq!(argmax(&[0.2, 0.7, 0.7]), Some((1, 0.7)));
        assert_eq!(argmax(&[]), None);
    }
}
