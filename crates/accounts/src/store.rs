//! Durable per-user records
//!
//! Manages a JSON file mapping usernames to their record (password digest
//! plus token balance). All writes use atomic temp-file + rename to prevent
//! corruption on crash. A tokio Mutex serializes concurrent mutations from
//! registration, charging, and refills.
//!
//! `update` is the primitive the ledger builds on: the caller's closure
//! runs against the record inside a single lock acquisition, and the file
//! is persisted before the lock is released. A closure that declines the
//! update leaves both memory and disk untouched. The lock is held only for
//! the in-memory change and the persist, never across a network await.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;

/// A single user's durable state.
///
/// The digest and the balance live in one record on purpose: they are
/// created together at registration and share the username key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Argon2 PHC string, never the plaintext password
    pub password_hash: String,
    /// Current token balance
    pub tokens: u64,
}

/// Outcome of a conditional update.
#[derive(Debug)]
pub enum Update<T> {
    /// Condition held; the record was mutated and persisted.
    Applied(T),
    /// The closure declined; nothing was written.
    Rejected,
    /// No record for that username; nothing was written.
    Missing,
}

/// Thread-safe user file manager.
///
/// Reads acquire the lock briefly to clone the requested record, so
/// verification and balance reads don't block behind a persist in
/// progress longer than necessary.
pub struct UserStore {
    path: PathBuf,
    state: Mutex<HashMap<String, UserRecord>>,
}

impl UserStore {
    /// Load user records from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (cold start with zero
    /// users).
    pub async fn load(path: PathBuf) -> Result<Self, StoreError> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StoreError::Io(format!("reading user file: {e}")))?;
            let users: HashMap<String, UserRecord> = serde_json::from_str(&contents)
                .map_err(|e| StoreError::Parse(format!("parsing user file: {e}")))?;
            info!(path = %path.display(), users = users.len(), "loaded user records");
            users
        } else {
            info!(path = %path.display(), "user file not found, starting with empty store");
            let users = HashMap::new();
            write_atomic(&path, &users).await?;
            users
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Get a clone of a specific user's record.
    pub async fn get(&self, username: &str) -> Option<UserRecord> {
        let state = self.state.lock().await;
        state.get(username).cloned()
    }

    /// Insert a record only if the username is free.
    ///
    /// Returns `false` without touching the file when the name is already
    /// taken. Uniqueness is decided under the same lock that performs the
    /// insert, so two concurrent registrations for one name cannot both
    /// succeed.
    pub async fn insert_new(&self, username: &str, record: UserRecord) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        if state.contains_key(username) {
            return Ok(false);
        }
        state.insert(username.to_string(), record);
        write_atomic(&self.path, &state).await?;
        debug!(username, "created user record");
        Ok(true)
    }

    /// Run a conditional update against one user's record.
    ///
    /// The closure receives a staged copy; returning `Some(out)` commits
    /// the staged record and persists, returning `None` discards it. Check
    /// and write happen under one lock acquisition — this is the single
    /// indivisible operation `charge_one` relies on.
    pub async fn update<T>(
        &self,
        username: &str,
        f: impl FnOnce(&mut UserRecord) -> Option<T>,
    ) -> Result<Update<T>, StoreError> {
        let mut state = self.state.lock().await;
        let applied = {
            let Some(record) = state.get_mut(username) else {
                return Ok(Update::Missing);
            };
            let mut staged = record.clone();
            match f(&mut staged) {
                Some(out) => {
                    *record = staged;
                    Some(out)
                }
                None => None,
            }
        };
        match applied {
            Some(out) => {
                write_atomic(&self.path, &state).await?;
                Ok(Update::Applied(out))
            }
            None => Ok(Update::Rejected),
        }
    }

    /// Whether the backing file is still reachable (readiness probe).
    pub async fn ping(&self) -> bool {
        tokio::fs::metadata(&self.path).await.is_ok()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Write user records to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains password digests.
async fn write_atomic(path: &Path, data: &HashMap<String, UserRecord>) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| StoreError::Parse(format!("serializing user records: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| StoreError::Io("user file path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".users.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| StoreError::Io(format!("writing temp user file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| StoreError::Io(format!("setting user file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::Io(format!("renaming temp user file: {e}")))?;

    debug!(path = %path.display(), "persisted user records");
    Ok(())
}
