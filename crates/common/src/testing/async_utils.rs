//! Async testing utilities

use std::future::Future;
use std::time::Duration;

/// Assert that an async condition becomes true within a timeout
///
/// # Examples
///
/// ```rust,ignore
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[tokio::test(flavor = "multi_thread")]
/// async fn gate_drains() {
///     let flag = Arc::new(AtomicBool::new(false));
///     let flag_clone = flag.clone();
///
///     tokio::spawn(async move {
///         tokio::time::sleep(Duration::from_millis(100)).await;
///         flag_clone.store(true, Ordering::SeqCst);
///     });
///
///     callguard_common::assert_eventually_async!(Duration::from_secs(1), async {
///         flag.load(Ordering::SeqCst)
///     });
/// }
/// ```
#[macro_export]
macro_rules! assert_eventually_async {
    ($timeout:expr, $fut:expr) => {{
        let timeout_duration = $timeout;
        let result = tokio::time::timeout(timeout_duration, async {
            loop {
                if $fut.await {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await;

        assert!(result.is_ok(), "Condition did not become true within {:?}", timeout_duration);
    }};
}

/// Await a future with a deadline
pub async fn timeout_ok<F, T>(duration: Duration, fut: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, fut).await
}

/// Poll an async condition until it returns true or `timeout` elapses
///
/// Uses tokio's clock, so it also works under `start_paused` tests.
pub async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }

    false
}

/// Yield to the scheduler `n` times so spawned tasks can make progress
pub async fn yield_times(n: usize) {
    for _ in 0..n {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timeout_ok_succeeds() {
        let result = timeout_ok(Duration::from_millis(100), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            42
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ok_times_out() {
        let result = timeout_ok(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        })
        .await;

        assert!(result.is_err());
    }

    /// Validates `poll_until` against a condition flipped by another task.
    ///
    /// Assertions:
    /// - Returns true once the flag is set.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_poll_until_observes_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag_clone.store(true, Ordering::SeqCst);
        });

        let observed = poll_until(Duration::from_secs(1), Duration::from_millis(5), || {
            let flag = Arc::clone(&flag);
            async move { flag.load(Ordering::SeqCst) }
        })
        .await;

        assert!(observed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_gives_up() {
        let polls = AtomicUsize::new(0);
        let observed = poll_until(Duration::from_millis(50), Duration::from_millis(10), || {
            polls.fetch_add(1, Ordering::SeqCst);
            async { false }
        })
        .await;

        assert!(!observed);
        assert!(polls.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_assert_eventually_async_macro() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        tokio::spawn(async move {
            for _ in 0..3 {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        crate::assert_eventually_async!(Duration::from_secs(1), async {
            counter.load(Ordering::SeqCst) == 3
        });
    }
}
