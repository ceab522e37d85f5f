//! Time bounds for calls into the store and the identity provider.

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

/// Await `fut` for at most `limit`.
///
/// Expiry and any error from `fut` both surface as [`AppError`]; expiry is
/// always `AppError::Transient`.
///
/// # Errors
///
/// Returns `AppError::Transient` on timeout, or `fut`'s error converted into
/// an `AppError`.
pub async fn bounded<T, E, F>(limit: Duration, what: &'static str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AppError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::warn!(operation = what, timeout_ms = %limit.as_millis(), "Operation timed out");
            Err(AppError::Transient(format!("{what} timed out")))
        }
    }
}
