use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InsufficientFunds,
    ServiceUnavailable,
    Conflict,
    LockNotAcquired,
    DataInconsistency,
    TransactionRejected,
    NetworkError,
    StorageError,
    SerializationError,
    EncodingError,
    ConfigError,
    InvalidStateTransition,
    InvalidRecord,
    SignerResponseMismatch,
    ResourceMissing,
    PendingRecordMissing,
    FeeOverflow,
    Unimplemented,
    Message,
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("{service} unavailable: {details}")]
    ServiceUnavailable { service: String, details: String },

    #[error("ownership conflict for uid_tag={uid_tag}: expected current_txid={expected}, found {actual}")]
    Conflict { uid_tag: String, expected: String, actual: String },

    #[error("lock not acquired: {0}")]
    LockNotAcquired(String),

    #[error("data inconsistency: {details}")]
    DataInconsistency { details: String },

    #[error("transaction rejected by ledger: {details}")]
    TransactionRejected { details: String },

    #[error("network error calling {service}: {details}")]
    NetworkError { service: String, details: String },

    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("invalid record: {details}")]
    InvalidRecord { details: String },

    #[error("signer response misaligned: requested {expected} signatures, received {actual}")]
    SignerResponseMismatch { expected: usize, actual: usize },

    #[error("resource not found: {outpoint}")]
    ResourceMissing { outpoint: String },

    #[error("pending record not found: {0}")]
    PendingRecordMissing(String),

    #[error("fee computation overflow: size={size_bytes} rate={rate_per_kb}")]
    FeeOverflow { size_bytes: u64, rate_per_kb: u64 },

    #[error("feature not implemented: {0}")]
    Unimplemented(String),

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, AnchorError>;

impl AnchorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AnchorError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            AnchorError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AnchorError::Conflict { .. } => ErrorCode::Conflict,
            AnchorError::LockNotAcquired(_) => ErrorCode::LockNotAcquired,
            AnchorError::DataInconsistency { .. } => ErrorCode::DataInconsistency,
            AnchorError::TransactionRejected { .. } => ErrorCode::TransactionRejected,
            AnchorError::NetworkError { .. } => ErrorCode::NetworkError,
            AnchorError::StorageError { .. } => ErrorCode::StorageError,
            AnchorError::SerializationError { .. } => ErrorCode::SerializationError,
            AnchorError::EncodingError(_) => ErrorCode::EncodingError,
            AnchorError::ConfigError(_) => ErrorCode::ConfigError,
            AnchorError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            AnchorError::InvalidRecord { .. } => ErrorCode::InvalidRecord,
            AnchorError::SignerResponseMismatch { .. } => ErrorCode::SignerResponseMismatch,
            AnchorError::ResourceMissing { .. } => ErrorCode::ResourceMissing,
            AnchorError::PendingRecordMissing(_) => ErrorCode::PendingRecordMissing,
            AnchorError::FeeOverflow { .. } => ErrorCode::FeeOverflow,
            AnchorError::Unimplemented(_) => ErrorCode::Unimplemented,
            AnchorError::Message(_) => ErrorCode::Message,
        }
    }

    pub fn context(&self) -> ErrorContext {
        ErrorContext { code: self.code(), message: self.to_string() }
    }

    /// Transient failures worth another attempt: network trouble and
    /// exhausted-but-temporary upstream outages. Logical failures
    /// (rejection, conflict, insufficient funds) are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnchorError::NetworkError { .. } | AnchorError::ServiceUnavailable { .. })
    }

    pub fn service_unavailable(service: impl Into<String>, details: impl Into<String>) -> Self {
        AnchorError::ServiceUnavailable { service: service.into(), details: details.into() }
    }

    pub fn network(service: impl Into<String>, details: impl Into<String>) -> Self {
        AnchorError::NetworkError { service: service.into(), details: details.into() }
    }

    pub fn inconsistency(details: impl Into<String>) -> Self {
        AnchorError::DataInconsistency { details: details.into() }
    }

    pub fn invalid_record(details: impl Into<String>) -> Self {
        AnchorError::InvalidRecord { details: details.into() }
    }
}

#[macro_export]
macro_rules! storage_err {
    ($op:expr, $err:expr) => {
        $crate::foundation::AnchorError::StorageError { operation: $op.into(), details: $err.to_string() }
    };
}

impl From<io::Error> for AnchorError {
    fn from(err: io::Error) -> Self {
        AnchorError::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

impl From<serde_json::Error> for AnchorError {
    fn from(err: serde_json::Error) -> Self {
        AnchorError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}

impl From<bincode::Error> for AnchorError {
    fn from(err: bincode::Error) -> Self {
        AnchorError::SerializationError { format: "bincode".to_string(), details: err.to_string() }
    }
}

impl From<rocksdb::Error> for AnchorError {
    fn from(err: rocksdb::Error) -> Self {
        AnchorError::StorageError { operation: "rocksdb".to_string(), details: err.to_string() }
    }
}

impl From<hex::FromHexError> for AnchorError {
    fn from(err: hex::FromHexError) -> Self {
        AnchorError::EncodingError(format!("hex decode error: {}", err))
    }
}

impl From<toml::de::Error> for AnchorError {
    fn from(err: toml::de::Error) -> Self {
        AnchorError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<figment::Error> for AnchorError {
    fn from(err: figment::Error) -> Self {
        AnchorError::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for AnchorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return AnchorError::NetworkError { service: "http".to_string(), details: err.to_string() };
        }
        AnchorError::Message(err.to_string())
    }
}

// NOTE: Avoid adding generic "stringly" error conversions here.
// Use structured `AnchorError` variants at the call site to preserve context.
