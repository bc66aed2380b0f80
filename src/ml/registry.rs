//! Model registry - loads classifiers from the models directory

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::classifier::{Classifier, LinearClassifier, Prediction};
use super::features::FeatureVector;
use super::MlError;

/// File extensions accepted for model files, in lookup order
pub const MODEL_EXTENSIONS: &[&str] = &["json", "onnx"];

/// Extensions this build can actually load
pub fn supported_extensions() -> &'static [&'static str] {
    if cfg!(feature = "onnx") {
        MODEL_EXTENSIONS
    } else {
        &MODEL_EXTENSIONS[..1]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub kind: &'static str,
}

struct LoadedModels {
    models: BTreeMap<String, Arc<dyn Classifier>>,
    default_model: Option<String>,
}

pub struct ModelRegistry {
    models_dir: PathBuf,
    inner: RwLock<LoadedModels>,
}

impl ModelRegistry {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            inner: RwLock::new(LoadedModels {
                models: BTreeMap::new(),
                default_model: None,
            }),
        }
    }

    /// Load the configured default model if its file exists
    pub fn initialize(&self, default_model: &str) {
        match self.load_model(default_model) {
            Ok(_) => {
                if let Err(e) = self.set_default(default_model) {
                    tracing::warn!("Failed to set default ML model: {}", e);
                } else {
                    tracing::info!("Initialized default ML model: {}", default_model);
                }
            }
            Err(MlError::ModelNotFound(_)) => {
                tracing::warn!(
                    "Default ML model '{}' not found in {}. ML features will be limited.",
                    default_model,
                    self.models_dir.display()
                );
            }
            Err(e) => tracing::warn!("Failed to load default ML model: {}", e),
        }
    }

    /// Load a model by name from the models directory (cached once loaded)
    pub fn load_model(&self, name: &str) -> Result<Arc<dyn Classifier>, MlError> {
        if let Some(model) = self.inner.read().models.get(name) {
            return Ok(model.clone());
        }

        let path = self.find_model_file(name)?;
        self.load_model_from(name, &path)
    }

    /// Load (or replace) a model from an explicit path
    pub fn load_model_from(&self, name: &str, path: &Path) -> Result<Arc<dyn Classifier>, MlError> {
        let model = open_model(name, path)?;
        self.insert(name, model.clone());
        Ok(model)
    }

    /// Store uploaded model bytes as `<name>.<extension>` and load them.
    ///
    /// The bytes are staged in a temporary file inside the models directory
    /// and only moved over the target once they load, so a rejected upload
    /// never touches an existing model file.
    pub fn install_model(
        &self,
        name: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<Arc<dyn Classifier>, MlError> {
        validate_model_name(name)?;
        std::fs::create_dir_all(&self.models_dir)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".upload-")
            .suffix(&format!(".{}", extension))
            .tempfile_in(&self.models_dir)?;
        staged.write_all(bytes)?;
        staged.flush()?;

        let model = open_model(name, staged.path())?;

        let target = self.models_dir.join(format!("{}.{}", name, extension));
        staged.persist(&target).map_err(|e| MlError::Io(e.error))?;

        self.insert(name, model.clone());
        Ok(model)
    }

    fn insert(&self, name: &str, model: Arc<dyn Classifier>) {
        tracing::info!("Loaded ML model: {} ({})", name, model.kind());
        self.inner.write().models.insert(name.to_string(), model);
    }

    fn find_model_file(&self, name: &str) -> Result<PathBuf, MlError> {
        validate_model_name(name)?;
        supported_extensions()
            .iter()
            .map(|ext| self.models_dir.join(format!("{}.{}", name, ext)))
            .find(|p| p.exists())
            .ok_or_else(|| MlError::ModelNotFound(name.to_string()))
    }

    pub fn set_default(&self, name: &str) -> Result<(), MlError> {
        let mut inner = self.inner.write();
        if !inner.models.contains_key(name) {
            return Err(MlError::ModelNotFound(name.to_string()));
        }
        inner.default_model = Some(name.to_string());
        Ok(())
    }

    pub fn default_model(&self) -> Option<String> {
        self.inner.read().default_model.clone()
    }

    pub fn list(&self) -> Vec<ModelInfo> {
        self.inner
            .read()
            .models
            .iter()
            .map(|(name, model)| ModelInfo {
                name: name.clone(),
                kind: model.kind(),
            })
            .collect()
    }

    /// Resolve a model: requested name, then default, then first loaded
    pub fn resolve(&self, name: Option<&str>) -> Result<(String, Arc<dyn Classifier>), MlError> {
        if let Some(name) = name {
            return self.load_model(name).map(|m| (name.to_string(), m));
        }

        let inner = self.inner.read();
        let chosen = inner
            .default_model
            .clone()
            .or_else(|| inner.models.keys().next().cloned())
            .ok_or(MlError::NoModelLoaded)?;
        let model = inner
            .models
            .get(&chosen)
            .cloned()
            .ok_or_else(|| MlError::ModelNotFound(chosen.clone()))?;
        Ok((chosen, model))
    }

    /// Predict with the resolved model, returning the model name used
    pub fn predict(
        &self,
        features: &FeatureVector,
        name: Option<&str>,
    ) -> Result<(String, Prediction), MlError> {
        let (model_name, model) = self.resolve(name)?;
        let prediction = model.predict(features)?;
        Ok((model_name, prediction))
    }
}

/// Parse a model file into a classifier without registering it
fn open_model(name: &str, path: &Path) -> Result<Arc<dyn Classifier>, MlError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let raw = std::fs::read_to_string(path)?;
            Ok(Arc::new(LinearClassifier::from_json(name, &raw)?))
        }
        #[cfg(feature = "onnx")]
        Some("onnx") => Ok(Arc::new(super::onnx::OnnxClassifier::load(name, path)?)),
        _ => Err(MlError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Model names become file names; keep them to a safe character set
pub fn validate_model_name(name: &str) -> Result<(), MlError> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(MlError::InvalidInput(format!("invalid model name '{}'", name)))
    }
}
