//! Retry helper for idempotent reads against the database and the revocation cache.

use std::future::Future;

use tracing::warn;

use super::errors::AuthError;

/// Run `op`, and run it once more if the first attempt failed with an
/// infrastructure error. Domain errors are returned immediately. Writes must
/// not go through here.
pub async fn retry_read_once<T, F, Fut>(what: &'static str, mut op: F) -> Result<T, AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AuthError>>,
{
    match op().await {
        Err(e) if e.is_infrastructure() => {
            warn!(operation = what, error = %e, "read failed, retrying once");
            op().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_infrastructure_errors_once() {
        let calls = AtomicUsize::new(0);
        let res: Result<u8, _> = retry_read_once("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 { Err(AuthError::Infrastructure("flaky".into())) } else { Ok(7) }
            }
        })
        .await;
        assert_eq!(res.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_second_failure() {
        let calls = AtomicUsize::new(0);
        let res: Result<u8, _> = retry_read_once("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AuthError::Infrastructure("down".into())) }
        })
        .await;
        assert!(res.unwrap_err().is_infrastructure());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn domain_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let res: Result<u8, _> = retry_read_once("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AuthError::UserNotFound) }
        })
        .await;
        assert!(matches!(res, Err(AuthError::UserNotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
