//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap pool acquisition, statements and probes with a deadline
//! - Map expiry to `DbError::Timeout` so it stays distinct from driver errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; dropping the inner future on expiry
//!   releases whatever it had acquired
//! - Timeouts count toward the circuit breaker like any other failure

use std::future::Future;
use std::time::Duration;
use tokio::time;

use crate::error::DbError;

/// Run `fut` with a mandatory deadline.
pub async fn bounded<F, T>(limit: Duration, fut: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    match time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DbError::Timeout(limit)),
    }
}

/// Run `fut` with an optional deadline.
pub async fn with_deadline<F, T>(limit: Option<Duration>, fut: F) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    match limit {
        Some(limit) => bounded(limit, fut).await,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_is_timeout_error() {
        let err = bounded(Duration::from_millis(50), async {
            time::sleep(Duration::from_secs(1)).await;
            Ok::<_, DbError>(())
        })
        .await
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_no_deadline_passes_through() {
        let value = with_deadline(None, async { Ok::<_, DbError>(42) }).await.unwrap();
        assert_eq!(value, 42);

        let err = with_deadline(Some(Duration::from_secs(1)), async {
            Err::<(), _>(DbError::Query("boom".into()))
        })
        .await
        .unwrap_err();
        assert!(!err.is_timeout());
    }
}
