//! Token accounting
//!
//! Balance mutations go through `UserStore::update`, which runs the
//! condition and the write inside one lock acquisition. `charge_one`
//! therefore cannot lose an update or drive a balance negative no matter
//! how many requests race on the same user: with a balance of one, exactly
//! one concurrent charge is applied and the rest are rejected.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::LedgerError;
use crate::store::{Update, UserStore};

/// Balance reads and atomic mutations over the shared user store.
#[derive(Clone)]
pub struct TokenLedger {
    store: Arc<UserStore>,
}

impl TokenLedger {
    pub fn new(store: Arc<UserStore>) -> Self {
        Self { store }
    }

    /// Current balance. Returns 0 for unknown users rather than failing;
    /// callers that need existence have already verified credentials.
    pub async fn balance(&self, username: &str) -> u64 {
        self.store
            .get(username)
            .await
            .map(|record| record.tokens)
            .unwrap_or(0)
    }

    /// Atomically test balance > 0 and decrement by exactly one.
    ///
    /// Fails with `InsufficientTokens` when the balance is 0 at evaluation
    /// time, without mutating anything. Returns the new balance.
    pub async fn charge_one(&self, username: &str) -> Result<u64, LedgerError> {
        let outcome = self
            .store
            .update(username, |record| {
                if record.tokens == 0 {
                    None
                } else {
                    record.tokens -= 1;
                    Some(record.tokens)
                }
            })
            .await?;
        match outcome {
            Update::Applied(balance) => {
                debug!(username, balance, "charged one token");
                Ok(balance)
            }
            Update::Rejected => Err(LedgerError::InsufficientTokens),
            Update::Missing => Err(LedgerError::UnknownUser),
        }
    }

    /// Atomically add a positive amount to the balance.
    ///
    /// Fails with `InvalidAmount` for amount = 0 and `UnknownUser` for
    /// absent usernames; neither failure touches the store. Returns the
    /// new balance.
    pub async fn credit(&self, username: &str, amount: u64) -> Result<u64, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let outcome = self
            .store
            .update(username, |record| {
                record.tokens = record.tokens.saturating_add(amount);
                Some(record.tokens)
            })
            .await?;
        match outcome {
            Update::Applied(balance) => {
                info!(username, amount, balance, "credited tokens");
                Ok(balance)
            }
            Update::Rejected | Update::Missing => Err(LedgerError::UnknownUser),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UserRecord;

    async fn ledger_with_user(dir: &tempfile::TempDir, tokens: u64) -> (TokenLedger, Arc<UserStore>) {
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
        (TokenLedger::new(store.clone()), store)
    }

    #[tokio::test]
    async fn balance_returns_zero_for_unknown_user() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _store) = ledger_with_user(&dir, 6).await;
        assert_eq!(ledger.balance("nobody").await, 0);
    }

    #[tokio::test]
    async fn charge_one_decrements_by_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _store) = ledger_with_user(&dir, 6).await;

        let balance = ledger.charge_one("alice").await.unwrap();
        assert_eq!(balance, 5);
        assert_eq!(ledger.balance("alice").await, 5);
    }

    #[tokio::test]
    async fn charge_one_at_zero_fails_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _store) = ledger_with_user(&dir, 0).await;

        let err = ledger.charge_one("alice").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientTokens));
        assert_eq!(ledger.balance("alice").await, 0);
    }

    #[tokio::test]
    async fn charge_one_unknown_user_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _store) = ledger_with_user(&dir, 6).await;

        let err = ledger.charge_one("nobody").await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownUser));
    }

    #[tokio::test]
    async fn credit_adds_exactly_the_amount() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _store) = ledger_with_user(&dir, 1).await;

        let balance = ledger.credit("alice", 5).await.unwrap();
        assert_eq!(balance, 6);
        assert_eq!(ledger.balance("alice").await, 6);
    }

    #[tokio::test]
    async fn credit_zero_is_invalid_amount_and_leaves_balance() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _store) = ledger_with_user(&dir, 3).await;

        let err = ledger.credit("alice", 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount));
        assert_eq!(ledger.balance("alice").await, 3);
    }

    #[tokio::test]
    async fn credit_unknown_user_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _store) = ledger_with_user(&dir, 3).await;

        let err = ledger.credit("nobody", 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownUser));
    }

    #[tokio::test]
    async fn concurrent_charges_on_one_token_yield_exactly_one_success() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _store) = ledger_with_user(&dir, 1).await;

        let mut handles = vec![];
        for _ in 0..8 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(
                async move { ledger.charge_one("alice").await },
            ));
        }

        let mut successes = 0;
        let mut insufficient = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => successes += 1,
                Err(LedgerError::InsufficientTokens) => insufficient += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 1, "exactly one concurrent charge may win");
        assert_eq!(insufficient, 7);
        assert_eq!(ledger.balance("alice").await, 0);
    }

    #[tokio::test]
    async fn interleaved_charges_and_credits_never_lose_an_update() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _store) = ledger_with_user(&dir, 10).await;

        // 10 starting + 5 credits of 2 - 10 charges = 10
        let mut handles = vec![];
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.charge_one("alice").await.map(|_| ())
            }));
        }
        for _ in 0..5 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.credit("alice", 2).await.map(|_| ())
            }));
        }

        for h in handles {
            // Every operation must succeed: the balance never reaches 0
            h.await.unwrap().unwrap();
        }

        assert_eq!(ledger.balance("alice").await, 10);
    }

    #[tokio::test]
    async fn charge_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        {
            let store = Arc::new(UserStore::load(path.clone()).await.unwrap());
            store
                .insert_new(
                    "alice",
                    UserRecord {
                        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$ZGlnZXN0".into(),
                        tokens: 6,
                    },
                )
                .await
                .unwrap();
            TokenLedger::new(store).charge_one("alice").await.unwrap();
        }

        let store = Arc::new(UserStore::load(path).await.unwrap());
        assert_eq!(TokenLedger::new(store).balance("alice").await, 5);
    }
}
