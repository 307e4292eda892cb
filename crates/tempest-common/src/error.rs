//! Closed error-kind set for the trading engine.
//!
//! Risk-cap refusals are NOT errors — they are decision outcomes recorded
//! as risk events. Everything that can actually fail maps onto one of the
//! kinds below, which drive retry policy and process exit codes.

use thiserror::Error;

/// Process exit codes.
pub const EXIT_OK: u8 = 0;
pub const EXIT_CONFIG: u8 = 1;
pub const EXIT_RECONCILE_MISMATCH: u8 = 2;
pub const EXIT_FATAL: u8 = 3;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    /// Retryable network failure (timeouts, 5xx, connection resets).
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Non-retryable API failure (4xx other than auth).
    #[error("permanent API error: status {status}: {message}")]
    PermanentApi { status: u16, message: String },

    /// Authentication failure. Pauses the order path until cleared.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("data validation failed: {0}")]
    DataValidation(String),

    /// Data too old to act on. The affected city is skipped this cycle.
    #[error("stale data: {0}")]
    StaleData(String),

    /// A state-machine edge outside the valid set. Programming error:
    /// log, record, skip the order — never crash the loop.
    #[error("invalid order transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("reconciliation mismatch: {0}")]
    ReconcileMismatch(String),

    /// Unrecoverable internal failure; halts the loop after persisting.
    #[error("fatal internal error: {0}")]
    FatalInternal(String),
}

impl CoreError {
    /// Transient errors are retried locally (bounded); once exhausted the
    /// caller downgrades them to `StaleData`/`DataValidation` and skips
    /// the affected city.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::TransientNetwork(_))
    }

    /// Fatal errors halt the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::FatalInternal(_))
    }

    /// Exit code this error maps to at the binary boundary.
    pub fn exit_code(&self) -> u8 {
        match self {
            CoreError::Config(_) => EXIT_CONFIG,
            CoreError::ReconcileMismatch(_) => EXIT_RECONCILE_MISMATCH,
            CoreError::Auth(_) | CoreError::FatalInternal(_) => EXIT_FATAL,
            _ => EXIT_FATAL,
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return CoreError::TransientNetwork(err.to_string());
        }
        if let Some(status) = err.status() {
            if status.is_server_error() {
                return CoreError::TransientNetwork(err.to_string());
            }
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return CoreError::Auth(err.to_string());
            }
            return CoreError::PermanentApi {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        CoreError::TransientNetwork(err.to_string())
    }
}

impl From<clickhouse::error::Error> for CoreError {
    fn from(err: clickhouse::error::Error) -> Self {
        CoreError::FatalInternal(format!("database: {}", err))
    }
}

impl From<crate::clickhouse::RepoError> for CoreError {
    fn from(err: crate::clickhouse::RepoError) -> Self {
        CoreError::FatalInternal(format!("repository: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CoreError::TransientNetwork("reset".into()).is_transient());
        assert!(!CoreError::Auth("bad key".into()).is_transient());
        assert!(!CoreError::StaleData("old".into()).is_transient());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CoreError::Config("x".into()).exit_code(), EXIT_CONFIG);
        assert_eq!(
            CoreError::ReconcileMismatch("x".into()).exit_code(),
            EXIT_RECONCILE_MISMATCH
        );
        assert_eq!(CoreError::Auth("x".into()).exit_code(), EXIT_FATAL);
        assert_eq!(CoreError::FatalInternal("x".into()).exit_code(), EXIT_FATAL);
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = CoreError::InvalidTransition {
            from: "FILLED".into(),
            to: "CANCELED".into(),
        };
        assert!(err.to_string().contains("FILLED -> CANCELED"));
    }
}
