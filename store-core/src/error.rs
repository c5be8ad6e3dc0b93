//! Error kinds shared by both workers.
//!
//! This generalizes the teacher's hand-rolled `CryptoError` (see
//! `crypto.rs`) into a multi-kind enum. Each variant maps onto exactly
//! one RPC status / HTTP status; the mapping lives here once so Main
//! Worker and Processing Worker never disagree on it.

use thiserror::Error;

/// The error kinds opaque to callers except via RPC code / HTTP status.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already locked: {0}")]
    AlreadyLocked(String),

    /// GCM tag mismatch on decrypt. Surfaced to callers as `Internal` —
    /// the variant is kept distinct internally so logs can tell tamper
    /// detection apart from other I/O failures.
    #[error("integrity check failed for {0}")]
    IntegrityError(String),

    #[error("processing worker not yet subscribed")]
    Unavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// The RPC status string carried in `ProcessResponse::status` /
    /// `error` fields.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::InvalidArgument(_) => "InvalidArgument",
            StoreError::Unauthorized => "Unauthorized",
            StoreError::Forbidden => "Forbidden",
            StoreError::NotFound(_) => "NotFound",
            StoreError::AlreadyLocked(_) => "AlreadyLocked",
            // Fail-closed: integrity failures never leak past "Internal".
            StoreError::IntegrityError(_) => "Internal",
            StoreError::Unavailable => "Unavailable",
            StoreError::Internal(_) => "Internal",
        }
    }
}

impl StoreError {
    /// The message safe to send to a caller. Crypto/I-O detail for
    /// `IntegrityError`/`Internal` is never forwarded past this point —
    /// only logged at the worker. No error message ever includes
    /// plaintext or key material.
    pub fn wire_message(&self) -> String {
        match self {
            StoreError::IntegrityError(_) | StoreError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for tonic::Status {
    fn from(err: StoreError) -> Self {
        let message = err.wire_message();
        match err {
            StoreError::InvalidArgument(_) => tonic::Status::invalid_argument(message),
            StoreError::Unauthorized => tonic::Status::unauthenticated(message),
            StoreError::Forbidden => tonic::Status::permission_denied(message),
            StoreError::NotFound(_) => tonic::Status::not_found(message),
            StoreError::AlreadyLocked(_) => tonic::Status::already_exists(message),
            StoreError::IntegrityError(_) => tonic::Status::internal(message),
            StoreError::Unavailable => tonic::Status::unavailable(message),
            StoreError::Internal(_) => tonic::Status::internal(message),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
