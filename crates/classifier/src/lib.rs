//! Classification capability boundary
//!
//! Defines the `Classifier` trait that decouples the request pipeline from
//! the concrete model backend. The service never owns a model: it injects
//! an implementation and shares it across concurrent requests, so tests
//! substitute deterministic stubs and the backend can be swapped without
//! touching the pipeline.
//!
//! `HttpClassifier` is the production implementation: it delegates to an
//! external inference server over HTTP. Preprocessing (resize, normalize)
//! is the backend's responsibility, behind this boundary.

pub mod format;
pub mod http;

pub use format::{ImageFormat, sniff_format};
pub use http::HttpClassifier;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// One ranked label with its model-assigned confidence in [0, 100].
///
/// Confidences are multi-label scores and need not sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

/// Errors from classification.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("unsupported image format")]
    UnsupportedFormat,

    #[error("inference failed: {0}")]
    Inference(String),
}

/// Result alias for classification operations.
pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Abstraction over model backends.
///
/// Implementations must be safe for concurrent invocation from many
/// requests at once; the service shares one instance via
/// `Arc<dyn Classifier>` and never serializes callers.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility.
pub trait Classifier: Send + Sync {
    /// Identifier for logging and readiness reporting (e.g. "http")
    fn id(&self) -> &str;

    /// Rank labels for the given image bytes, best first.
    fn classify<'a>(
        &'a self,
        bytes: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Prediction>>> + Send + 'a>>;

    /// Whether the backend can serve inference right now. Drives the
    /// readiness probe; must not panic when the backend is down.
    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}
