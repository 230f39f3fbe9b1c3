//! Store error model and the timeout guard every protocol store call goes through.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, warn};

use super::error::AuthError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out")]
    Timeout,

    #[error("Duplicate key: {0}")]
    Conflict(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        match err.kind.as_ref() {
            ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == 11000 => {
                StoreError::Conflict(write_error.message.clone())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) | StoreError::Timeout => AuthError::StoreUnavailable,
            StoreError::Conflict(message) | StoreError::Backend(message) => AuthError::internal(message),
        }
    }
}

/// Run a store operation with an upper bound on its duration.
///
/// Timeouts and connectivity failures surface as `StoreUnavailable`.
pub async fn guarded<T, F>(timeout: Duration, operation: &'static str, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!(operation, error = %e, "Store operation failed");
            Err(e.into())
        }
        Err(_) => {
            warn!(operation, timeout_ms = timeout.as_millis() as u64, "Store operation timed out");
            Err(AuthError::StoreUnavailable)
        }
    }
}
