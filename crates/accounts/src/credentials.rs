//! Credential registration and verification
//!
//! Passwords are stored as salted Argon2id digests (PHC strings) and
//! verified through the Argon2 verifier, which compares in constant time.
//! The plaintext never reaches the store or the logs.

use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
};
use tracing::info;

use crate::error::{AuthError, StoreError};
use crate::store::{UserRecord, UserStore};

/// Registration and login checks over the shared user store.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<UserStore>,
    starting_tokens: u64,
}

impl CredentialStore {
    /// Create a credential facade. `starting_tokens` is the balance every
    /// new user begins with.
    pub fn new(store: Arc<UserStore>, starting_tokens: u64) -> Self {
        Self {
            store,
            starting_tokens,
        }
    }

    /// Register a new user.
    ///
    /// Hashes the password with a fresh random salt and creates the record
    /// with the starting token balance in one write. Fails with
    /// `AlreadyExists` if the username is taken; the existing record is
    /// not touched in that case.
    ///
    /// The digest is computed before taking the store lock so slow hashing
    /// doesn't serialize unrelated registrations.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| StoreError::Hash(e.to_string()))?
            .to_string();

        let record = UserRecord {
            password_hash,
            tokens: self.starting_tokens,
        };
        if !self.store.insert_new(username, record).await? {
            return Err(AuthError::AlreadyExists);
        }
        info!(username, tokens = self.starting_tokens, "user registered");
        Ok(())
    }

    /// Verify a username/password pair. Read-only.
    ///
    /// Unknown usernames fail with `InvalidUsername`; a digest mismatch
    /// fails with `InvalidPassword`. The comparison goes through the
    /// Argon2 verifier, never `==` on digest strings.
    pub async fn verify(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let Some(record) = self.store.get(username).await else {
            return Err(AuthError::InvalidUsername);
        };
        let parsed = PasswordHash::new(&record.password_hash)
            .map_err(|e| StoreError::Hash(format!("stored digest for {username}: {e}")))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidPassword)
    }
}
