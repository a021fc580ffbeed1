//! Deadline enforcement for outbound work.
//!
//! A request gets one `Instant` deadline up front; every branch that works
//! toward it is wrapped with the same deadline, so expiry is observed the
//! same way no matter which branch is slow.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{GatewayError, GatewayResult};

/// Absolute deadline `budget` from now.
pub fn deadline_after(budget: Duration) -> Instant {
    Instant::now() + budget
}

/// Run `fut` until `deadline`. Expiry maps to `UpstreamTimeout` for `dependency`.
pub async fn with_deadline<T, F>(
    deadline: Instant,
    dependency: &'static str,
    fut: F,
) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(dependency, "Deadline exceeded");
            Err(GatewayError::UpstreamTimeout { dependency })
        }
    }
}

/// Run two independent branches concurrently under one deadline.
///
/// The first error wins and the sibling is dropped before returning, so no
/// partial result escapes.
pub async fn join_with_deadline<A, B, FA, FB>(
    deadline: Instant,
    left: (&'static str, FA),
    right: (&'static str, FB),
) -> GatewayResult<(A, B)>
where
    FA: Future<Output = GatewayResult<A>>,
    FB: Future<Output = GatewayResult<B>>,
{
    let (left_name, left_fut) = left;
    let (right_name, right_fut) = right;

    tokio::try_join!(
        with_deadline(deadline, left_name, left_fut),
        with_deadline(deadline, right_name, right_fut),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_both_branches_complete() {
        let deadline = deadline_after(Duration::from_secs(1));
        let result = join_with_deadline(
            deadline,
            ("left", async { Ok::<_, GatewayError>(1) }),
            ("right", async { Ok::<_, GatewayError>("two") }),
        )
        .await;

        assert_eq!(result.unwrap(), (1, "two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_branch_times_out() {
        let deadline = deadline_after(Duration::from_millis(100));
        let result = join_with_deadline(
            deadline,
            ("fast", async { Ok::<_, GatewayError>(1) }),
            ("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, GatewayError>(2)
            }),
        )
        .await;

        assert_eq!(result, Err(GatewayError::UpstreamTimeout { dependency: "slow" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_failure_cancels_sibling() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let deadline = deadline_after(Duration::from_secs(5));
        let result: GatewayResult<((), ())> = join_with_deadline(
            deadline,
            ("failing", async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err(GatewayError::ValidationFailed("bad".into()))
            }),
            ("sibling", async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }),
        )
        .await;

        assert_eq!(result, Err(GatewayError::ValidationFailed("bad".into())));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!finished.load(Ordering::SeqCst), "sibling must be dropped");
    }
}
