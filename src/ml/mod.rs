//! ML Module - feature extraction, classifier loading, inference pipeline
//!
//! Keeps inference separate from HTTP handlers so models can be swapped
//! without touching the routes.

pub mod features;
pub mod classifier;
pub mod registry;
pub mod pipeline;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use features::{InferenceInput, LayoutInfo};
pub use registry::ModelRegistry;
pub use pipeline::InferenceOutcome;

#[derive(Debug, thiserror::Error)]
pub enum MlError {
    #[error("No model loaded and no default model specified")]
    NoModelLoaded,

    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    #[error("Failed to load model {name}: {reason}")]
    ModelLoad { name: String, reason: String },

    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("Feature layout mismatch: model expects {actual} features, extractor produces {expected}")]
    LayoutMismatch { expected: usize, actual: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
