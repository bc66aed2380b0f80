//! ONNX classifier - ONNX Runtime integration
//!
//! Expects a classifier exported without the ZipMap post-processor, so that
//! it yields an int64 `label` tensor and a float `probabilities` tensor.
//! Class names come from an optional `<name>.classes.json` next to the model.

use std::path::Path;

use ndarray::Array2;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Value;
use parking_lot::Mutex;

use super::classifier::{argmax, Classifier, Prediction};
use super::features::{FeatureVector, FEATURE_COUNT};
use super::MlError;

/// Confidence reported when the graph has no probability output
const DEFAULT_CONFIDENCE: f32 = 0.5;

pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    classes: Option<Vec<String>>,
}

impl OnnxClassifier {
    pub fn load(name: &str, model_path: &Path) -> Result<Self, MlError> {
        tracing::info!("Loading ONNX model from: {}", model_path.display());

        let load_err = |stage: &str, e: ort::Error| MlError::ModelLoad {
            name: name.to_string(),
            reason: format!("{}: {}", stage, e),
        };

        let session = Session::builder()
            .map_err(|e| load_err("session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_err("optimization", e))?
            .commit_from_file(model_path)
            .map_err(|e| load_err("load", e))?;

        let classes_path = model_path.with_extension("classes.json");
        let classes = if classes_path.exists() {
            let raw = std::fs::read_to_string(&classes_path)?;
            let classes: Vec<String> = serde_json::from_str(&raw).map_err(|e| MlError::ModelLoad {
                name: name.to_string(),
                reason: format!("classes file: {}", e),
            })?;
            Some(classes)
        } else {
            None
        };

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            classes,
        })
    }

    fn class_name(&self, index: usize) -> String {
        self.classes
            .as_ref()
            .and_then(|c| c.get(index).cloned())
            .unwrap_or_else(|| index.to_string())
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, features: &FeatureVector) -> Result<Prediction, MlError> {
        let inference_err = |e: ort::Error| MlError::Inference(format!("{}: {}", self.name, e));

        let input_array = Array2::<f32>::from_shape_vec((1, FEATURE_COUNT), features.to_vector().to_vec())
            .map_err(|e| MlError::Inference(format!("Array error: {}", e)))?;
        let input_tensor = Value::from_array(input_array).map_err(inference_err)?;

        let mut session = self.session.lock();
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        let outputs = session.run(ort::inputs![input_tensor]).map_err(inference_err)?;

        let probabilities = output_names
            .iter()
            .find(|n| n.contains("prob"))
            .and_then(|n| outputs.get(n.as_str()))
            .and_then(|v| v.try_extract_tensor::<f32>().ok())
            .map(|(_, data)| data.iter().map(|p| f64::from(*p)).collect::<Vec<f64>>());

        if let Some(probs) = probabilities {
            let (index, confidence) = argmax(&probs)
                .ok_or_else(|| MlError::Inference("empty probability output".to_string()))?;
            if !confidence.is_finite() {
                return Err(MlError::Inference(format!("{}: non-finite probability", self.name)));
            }
            return Ok(Prediction {
                label: self.class_name(index),
                confidence: confidence.clamp(0.0, 1.0) as f32,
            });
        }

        let label_name = output_names
            .first()
            .ok_or_else(|| MlError::Inference("No output defined".to_string()))?;
        let label = outputs
            .get(label_name.as_str())
            .ok_or_else(|| MlError::Inference("No output".to_string()))?
            .try_extract_tensor::<i64>()
            .map_err(inference_err)?
            .1
            .first()
            .copied()
            .ok_or_else(|| MlError::Inference("empty label output".to_string()))?;

        Ok(Prediction {
            label: self.class_name(label.max(0) as usize),
            confidence: DEFAULT_CONFIDENCE,
        })
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }
}
