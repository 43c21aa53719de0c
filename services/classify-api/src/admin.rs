//! Admin refill service
//!
//! Credits tokens to a user after verifying the administrative secret.
//! The secret is configured as an Argon2 PHC digest (env var or file), so
//! it can be rotated without a rebuild, and the comparison goes through
//! the Argon2 verifier rather than string equality.
//!
//! The secret is checked before user existence: a caller holding a wrong
//! secret learns nothing about which accounts exist.

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordVerifier};
use axum::Json;
use axum::extract::State;
use axum::response::Response;
use common::Secret;
use serde::Deserialize;
use tracing::{info, warn};

use accounts::{LedgerError, TokenLedger};

use crate::AppState;
use crate::api::api_message;
use crate::error::AdminError;

/// Secret-gated credit operations.
#[derive(Clone)]
pub struct AdminRefillService {
    secret_hash: Secret<String>,
    ledger: TokenLedger,
}

impl AdminRefillService {
    pub fn new(secret_hash: Secret<String>, ledger: TokenLedger) -> Self {
        Self {
            secret_hash,
            ledger,
        }
    }

    /// Verify the admin secret and credit `amount` tokens to `username`.
    ///
    /// Returns the new balance. Fails with `InvalidSecret` before anything
    /// else, `InvalidAmount` for amount <= 0, `UnknownUser` for absent
    /// usernames; no failure mutates the ledger.
    pub async fn refill(
        &self,
        username: &str,
        secret: &str,
        amount: i64,
    ) -> Result<u64, AdminError> {
        let parsed = PasswordHash::new(self.secret_hash.expose())
            .map_err(|e| AdminError::Store(format!("configured admin digest: {e}")))?;
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .map_err(|_| AdminError::InvalidSecret)?;

        if amount <= 0 {
            return Err(AdminError::InvalidAmount);
        }

        match self.ledger.credit(username, amount as u64).await {
            Ok(balance) => Ok(balance),
            Err(LedgerError::UnknownUser) => Err(AdminError::UnknownUser),
            Err(LedgerError::InvalidAmount) => Err(AdminError::InvalidAmount),
            Err(e) => Err(AdminError::Store(e.to_string())),
        }
    }
}

/// Request body for the refill endpoint.
///
/// `amount` is signed on purpose: a negative value must be answered with
/// the InvalidAmount contract rather than a deserialization rejection.
#[derive(Deserialize)]
pub struct RefillRequest {
    pub username: String,
    pub admin_secret: String,
    pub amount: i64,
}

/// POST /v1/refill — credit tokens to a user.
pub async fn refill_handler(
    State(state): State<AppState>,
    Json(body): Json<RefillRequest>,
) -> Response {
    match state
        .admin
        .refill(&body.username, &body.admin_secret, body.amount)
        .await
    {
        Ok(balance) => {
            info!(username = %body.username, amount = body.amount, balance, "tokens refilled");
            api_message(200, "Refilled successfully")
        }
        Err(e) => {
            warn!(username = %body.username, error = %e, "refill rejected");
            api_message(e.status(), e.message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accounts::{UserRecord, UserStore};
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};
    use std::sync::Arc;

    const ADMIN_SECRET: &str = "rotate-me-quarterly";

    fn admin_digest() -> Secret<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = Argon2::default()
            .hash_password(ADMIN_SECRET.as_bytes(), &salt)
            .unwrap()
            .to_string();
        Secret::new(digest)
    }

    async fn test_service(dir: &tempfile::TempDir, tokens: u64) -> (AdminRefillService, TokenLedger) {
        let store = Arc::new(
            UserStore::load(dir.path().join("users.json")).await.unwrap(),
        );
        store
            .insert_new(
                "alice",
                UserRecord {
                    password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$ZGlnZXN0".into(),
                    tokens,
                },
            )
            .await
            .unwrap();
        let ledger = TokenLedger::new(store);
        (
            AdminRefillService::new(admin_digest(), ledger.clone()),
            ledger,
        )
    }

    #[tokio::test]
    async fn refill_with_correct_secret_credits_exactly_the_amount() {
        let dir = tempfile::tempdir().unwrap();
        let (service, ledger) = test_service(&dir, 1).await;

        let balance = service.refill("alice", ADMIN_SECRET, 5).await.unwrap();
        assert_eq!(balance, 6);
        assert_eq!(ledger.balance("alice").await, 6);
    }

    #[tokio::test]
    async fn refill_with_wrong_secret_rejected_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let (service, ledger) = test_service(&dir, 1).await;

        let err = service.refill("alice", "guessed-wrong", 5).await.unwrap_err();
        assert!(matches!(err, AdminError::InvalidSecret));
        assert_eq!(ledger.balance("alice").await, 1);
    }

    #[tokio::test]
    async fn refill_zero_amount_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let (service, ledger) = test_service(&dir, 1).await;

        let err = service.refill("alice", ADMIN_SECRET, 0).await.unwrap_err();
        assert!(matches!(err, AdminError::InvalidAmount));
        assert_eq!(ledger.balance("alice").await, 1);
    }

    #[tokio::test]
    async fn refill_negative_amount_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let (service, ledger) = test_service(&dir, 1).await;

        let err = service.refill("alice", ADMIN_SECRET, -5).await.unwrap_err();
        assert!(matches!(err, AdminError::InvalidAmount));
        assert_eq!(ledger.balance("alice").await, 1);
    }

    #[tokio::test]
    async fn refill_unknown_user_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _ledger) = test_service(&dir, 1).await;

        let err = service.refill("nobody", ADMIN_SECRET, 5).await.unwrap_err();
        assert!(matches!(err, AdminError::UnknownUser));
    }

    #[tokio::test]
    async fn wrong_secret_answers_the_same_for_known_and_unknown_users() {
        // The secret gate comes first, so a bad secret cannot be used to
        // probe which usernames exist.
        let dir = tempfile::tempdir().unwrap();
        let (service, _ledger) = test_service(&dir, 1).await;

        let known = service.refill("alice", "wrong", 5).await.unwrap_err();
        let unknown = service.refill("nobody", "wrong", 5).await.unwrap_err();
        assert!(matches!(known, AdminError::InvalidSecret));
        assert!(matches!(unknown, AdminError::InvalidSecret));
    }
}
