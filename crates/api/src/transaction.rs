//! Request-scoped transaction wrapper.

use std::time::Duration;

use futures_util::future::BoxFuture;
use store::{Database, Transaction};
use tokio::time::{Instant, timeout_at};

use crate::error::ApiError;

/// Runs `f` inside a fresh transaction.
///
/// Commits when `f` succeeds. Rolls back when it fails or when `deadline`
/// expires first; the latter is reported as [`ApiError::DeadlineExceeded`].
/// The deadline also bounds waiting for the transaction to begin and to
/// commit. A commit cut short by the deadline has an unknown outcome.
/// The handle is passed to `f` explicitly and never outlives this call.
pub async fn with_transaction<D, T, F>(db: &D, deadline: Duration, f: F) -> Result<T, ApiError>
where
    D: Database,
    T: Send,
    F: for<'t> FnOnce(&'t mut D::Tx) -> BoxFuture<'t, Result<T, ApiError>> + Send,
{
    let expires = Instant::now() + deadline;

    let Ok(begun) = timeout_at(expires, db.begin()).await else {
        return Err(expired(deadline, "begin"));
    };
    let mut tx = begun?;
    tracing::info!("BEGIN");

    match timeout_at(expires, f(&mut tx)).await {
        Ok(Ok(value)) => match timeout_at(expires, tx.commit()).await {
            Ok(committed) => {
                committed?;
                tracing::info!("COMMIT");
                Ok(value)
            }
            Err(_) => Err(expired(deadline, "commit")),
        },
        Ok(Err(err)) => {
            rollback(tx).await;
            Err(err)
        }
        Err(_) => {
            let err = expired(deadline, "body");
            rollback(tx).await;
            Err(err)
        }
    }
}

fn expired(deadline: Duration, stage: &'static str) -> ApiError {
    let deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
    tracing::warn!(deadline_ms, stage, "transaction deadline exceeded");
    ApiError::DeadlineExceeded
}

async fn rollback<X: Transaction>(tx: X) {
    match tx.rollback().await {
        Ok(()) => tracing::info!("ROLLBACK"),
        Err(e) => tracing::error!(error = %e, "ROLLBACK failed"),
    }
}
