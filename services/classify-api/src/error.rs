//! Error taxonomy for the request pipeline
//!
//! Every failure is recovered at the handler boundary and translated into
//! the body-level `{status, msg}` contract; none propagate as transport
//! faults, and none mutate the stores.

use accounts::AuthError;
use classifier::ClassifyError;
use thiserror::Error;

/// Resource retrieval failures. None of these touch the ledger.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no url provided")]
    InvalidUrl,

    #[error("fetch timed out")]
    Timeout,

    #[error("payload exceeds {0} bytes")]
    TooLarge(usize),

    #[error("network error: {0}")]
    Network(String),
}

/// Admin refill failures.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("invalid admin secret")]
    InvalidSecret,

    #[error("unknown user")]
    UnknownUser,

    #[error("amount must be a positive integer")]
    InvalidAmount,

    #[error("store error: {0}")]
    Store(String),
}

impl AdminError {
    /// Body-level status code per the public contract.
    pub fn status(&self) -> u16 {
        match self {
            AdminError::UnknownUser => 301,
            AdminError::InvalidSecret => 302,
            AdminError::InvalidAmount => 400,
            AdminError::Store(_) => 500,
        }
    }

    /// Client-facing message. Store details stay in the logs.
    pub fn message(&self) -> &'static str {
        match self {
            AdminError::UnknownUser => "Invalid Username",
            AdminError::InvalidSecret => "Invalid Admin Password",
            AdminError::InvalidAmount => "Invalid amount",
            AdminError::Store(_) => "Internal error",
        }
    }
}

/// A classify request abort, carrying which step failed.
#[derive(Debug, Error)]
pub enum ClassifyFailure {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("out of tokens")]
    OutOfTokens,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error("store error: {0}")]
    Store(String),
}

impl ClassifyFailure {
    /// Body-level status code per the public contract. The original
    /// statuses (301/302/303/400) are kept verbatim; failure modes the
    /// original left unmapped get HTTP-shaped codes.
    pub fn status(&self) -> u16 {
        match self {
            ClassifyFailure::Auth(AuthError::InvalidUsername | AuthError::AlreadyExists) => 301,
            ClassifyFailure::Auth(AuthError::InvalidPassword) => 302,
            ClassifyFailure::Auth(AuthError::Store(_)) => 500,
            ClassifyFailure::OutOfTokens => 303,
            ClassifyFailure::Fetch(FetchError::InvalidUrl) => 400,
            ClassifyFailure::Fetch(FetchError::Timeout) => 408,
            ClassifyFailure::Fetch(FetchError::TooLarge(_)) => 413,
            ClassifyFailure::Fetch(FetchError::Network(_)) => 502,
            ClassifyFailure::Classify(ClassifyError::UnsupportedFormat) => 415,
            ClassifyFailure::Classify(ClassifyError::Inference(_)) => 500,
            ClassifyFailure::Store(_) => 500,
        }
    }

    /// Pipeline stage that aborted the request, for the failure counter.
    pub fn stage(&self) -> &'static str {
        match self {
            ClassifyFailure::Auth(_) => "auth",
            ClassifyFailure::OutOfTokens => "ledger",
            ClassifyFailure::Fetch(_) => "fetch",
            ClassifyFailure::Classify(_) => "inference",
            ClassifyFailure::Store(_) => "store",
        }
    }

    /// Client-facing message. Internal detail stays in the logs.
    pub fn message(&self) -> &'static str {
        match self {
            ClassifyFailure::Auth(AuthError::InvalidUsername | AuthError::AlreadyExists) => {
                "Invalid Username"
            }
            ClassifyFailure::Auth(AuthError::InvalidPassword) => "Invalid Password",
            ClassifyFailure::Auth(AuthError::Store(_)) => "Internal error",
            ClassifyFailure::OutOfTokens => "You are out of tokens, please refill",
            ClassifyFailure::Fetch(FetchError::InvalidUrl) => "No url Provided",
            ClassifyFailure::Fetch(FetchError::Timeout) => "Image fetch timed out",
            ClassifyFailure::Fetch(FetchError::TooLarge(_)) => "Image exceeds the size limit",
            ClassifyFailure::Fetch(FetchError::Network(_)) => "Could not retrieve image",
            ClassifyFailure::Classify(ClassifyError::UnsupportedFormat) => {
                "Unsupported image format"
            }
            ClassifyFailure::Classify(ClassifyError::Inference(_)) => "Classification failed",
            ClassifyFailure::Store(_) => "Internal error",
        }
    }
}
