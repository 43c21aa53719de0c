//! Error types for account operations

use thiserror::Error;

/// Storage-level failures underneath both facades.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("user file parse error: {0}")]
    Parse(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Credential verification and registration failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user already exists")]
    AlreadyExists,

    #[error("invalid username")]
    InvalidUsername,

    #[error("invalid password")]
    InvalidPassword,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Token accounting failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient tokens")]
    InsufficientTokens,

    #[error("unknown user")]
    UnknownUser,

    #[error("amount must be a positive integer")]
    InvalidAmount,

    #[error(transparent)]
    Store(#[from] StoreError),
}
