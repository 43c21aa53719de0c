//! HTTP inference backend
//!
//! Delegates classification to an external inference server: the image
//! bytes are posted as-is and the server replies with ranked label/score
//! pairs. The server owns the model and its preprocessing; this side only
//! validates the payload looks like an image, scales scores to [0, 100],
//! and caps the list at top-K.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::format::sniff_format;
use crate::{Classifier, ClassifyError, Prediction, Result};

/// Response body from the inference server.
///
/// Scores are model probabilities in [0, 1]; they are scaled to the
/// service's [0, 100] confidence range on the way out.
#[derive(Debug, Deserialize)]
struct InferenceResponse {
    predictions: Vec<RawPrediction>,
}

#[derive(Debug, Deserialize)]
struct RawPrediction {
    label: String,
    score: f32,
}

/// Classifier backed by an external inference server.
///
/// Stateless over a shared reqwest client, so concurrent requests never
/// contend on it.
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    top_k: usize,
    timeout: Duration,
}

impl HttpClassifier {
    /// Create a classifier posting to `endpoint` with the given per-call
    /// timeout, returning at most `top_k` predictions.
    pub fn new(client: reqwest::Client, endpoint: String, top_k: usize, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            top_k,
            timeout,
        }
    }

    async fn classify_inner(&self, bytes: &[u8]) -> Result<Vec<Prediction>> {
        let format = sniff_format(bytes).ok_or(ClassifyError::UnsupportedFormat)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, format.mime())
            .timeout(self.timeout)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ClassifyError::Inference(format!("inference request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "inference server returned an error");
            return Err(ClassifyError::Inference(format!(
                "inference server returned {status}: {body}"
            )));
        }

        let parsed: InferenceResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Inference(format!("invalid inference response: {e}")))?;

        let mut predictions: Vec<Prediction> = parsed
            .predictions
            .into_iter()
            .map(|p| Prediction {
                label: p.label,
                confidence: (p.score * 100.0).clamp(0.0, 100.0),
            })
            .collect();
        predictions.truncate(self.top_k);

        debug!(
            format = ?format,
            returned = predictions.len(),
            "classification complete"
        );
        Ok(predictions)
    }
}

impl Classifier for HttpClassifier {
    fn id(&self) -> &str {
        "http"
    }

    fn classify<'a>(
        &'a self,
        bytes: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Prediction>>> + Send + 'a>> {
        Box::pin(self.classify_inner(bytes))
    }

    fn ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        // Any HTTP answer counts as reachable; only transport failures
        // (refused, DNS, timeout) mark the backend not ready.
        Box::pin(async move {
            self.client
                .get(&self.endpoint)
                .timeout(self.timeout)
                .send()
                .await
                .is_ok()
        })
    }
}
