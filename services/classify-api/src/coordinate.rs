//! Request orchestration
//!
//! One classify call walks credential check → balance fast path → fetch →
//! inference → charge. The charge comes strictly after a successful
//! classification, so no failure path can debit the ledger; and because
//! `charge_one` is the authoritative atomic gate, a concurrent request can
//! still win the last token between the fast-path read and the charge — in
//! that case the computed result is discarded and the caller sees
//! out-of-tokens. Never a charge without a delivered result, never a
//! result without a charge.

use std::sync::Arc;

use accounts::{CredentialStore, LedgerError, TokenLedger};
use classifier::{Classifier, Prediction};
use tracing::{debug, warn};

use crate::error::ClassifyFailure;
use crate::fetch::ResourceFetcher;

/// Orchestrates one classification request end to end.
#[derive(Clone)]
pub struct Coordinator {
    credentials: CredentialStore,
    ledger: TokenLedger,
    fetcher: ResourceFetcher,
    classifier: Arc<dyn Classifier>,
}

impl Coordinator {
    pub fn new(
        credentials: CredentialStore,
        ledger: TokenLedger,
        fetcher: ResourceFetcher,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            credentials,
            ledger,
            fetcher,
            classifier,
        }
    }

    /// Run the full pipeline for one request.
    ///
    /// Aborts carry the failing step; every abort leaves the stores in the
    /// state they held before the call.
    pub async fn classify(
        &self,
        username: &str,
        password: &str,
        url: &str,
    ) -> Result<Vec<Prediction>, ClassifyFailure> {
        // 1. Identity. No ledger or fetch activity on failure.
        self.credentials.verify(username, password).await?;

        // 2. Fast-path balance read. Fail fast for users already at zero;
        //    the atomic charge in step 5 remains the authoritative gate.
        if self.ledger.balance(username).await == 0 {
            return Err(ClassifyFailure::OutOfTokens);
        }

        // 3. Retrieval, bounded in size and time.
        let image = self.fetcher.fetch(url).await?;

        // 4. Inference. A failed classification never charges.
        let predictions = self.classifier.classify(&image.bytes).await?;

        // 5. Charge exactly one token, after success only.
        match self.ledger.charge_one(username).await {
            Ok(balance) => {
                debug!(username, balance, labels = predictions.len(), "classification charged");
                Ok(predictions)
            }
            Err(LedgerError::InsufficientTokens) => {
                // A concurrent request spent the last token after step 2;
                // the inference work is discarded unpaid.
                warn!(username, "balance exhausted between fast path and charge");
                Err(ClassifyFailure::OutOfTokens)
            }
            Err(e) => Err(ClassifyFailure::Store(e.to_string())),
        }
    }
}
