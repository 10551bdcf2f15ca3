//! Concurrency ceiling with a configurable overflow policy.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{SandboxError, SandboxResult};

/// What happens when all slots are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Fail immediately.
    Reject,
    /// Wait for a slot, with at most `max_waiters` waiting at once and each
    /// waiting no longer than `max_wait`.
    Queue {
        /// Maximum simultaneous waiters.
        max_waiters: usize,
        /// Longest a waiter waits.
        max_wait: Duration,
    },
}

/// Hands out at most `K` execution permits.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
    overflow: Overflow,
    waiting: AtomicUsize,
}

struct WaiterSlot<'a>(&'a AtomicUsize);

impl Drop for WaiterSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyLimiter {
    /// Create a limiter with `capacity` slots.
    #[must_use]
    pub fn new(capacity: usize, overflow: Overflow) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            overflow,
            waiting: AtomicUsize::new(0),
        }
    }

    /// Acquire a slot according to the overflow policy.
    ///
    /// # Errors
    ///
    /// Returns [`SandboxError::Backpressure`] when no slot is available
    /// within the policy's limits.
    pub async fn acquire(&self) -> SandboxResult<OwnedSemaphorePermit> {
        if let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
            return Ok(permit);
        }

        match self.overflow {
            Overflow::Reject => Err(SandboxError::Backpressure(format!(
                "all {} execution slots are busy",
                self.capacity
            ))),
            Overflow::Queue {
                max_waiters,
                max_wait,
            } => {
                let previous = self.waiting.fetch_add(1, Ordering::AcqRel);
                let _slot = WaiterSlot(&self.waiting);
                if previous >= max_waiters {
                    return Err(SandboxError::Backpressure(format!(
                        "execution queue is full ({max_waiters} waiting)"
                    )));
                }
                debug!(waiting = previous.saturating_add(1), "queued for execution slot");
                match tokio::time::timeout(max_wait, Arc::clone(&self.permits).acquire_owned())
                    .await
                {
                    Ok(Ok(permit)) => Ok(permit),
                    Ok(Err(_closed)) => Err(SandboxError::Backpressure(
                        "execution slots are closed".to_owned(),
                    )),
                    Err(_elapsed) => Err(SandboxError::Backpressure(format!(
                        "no execution slot within {}ms",
                        max_wait.as_millis()
                    ))),
                }
            },
        }
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Callers currently waiting in the queue.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Total slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reject_mode_fails_fast() {
        let limiter = ConcurrencyLimiter::new(1, Overflow::Reject);
        let _held = limiter.acquire().await.unwrap();
        assert!(matches!(
            limiter.acquire().await,
            Err(SandboxError::Backpressure(_))
        ));
    }

    #[tokio::test]
    async fn test_permit_release_frees_slot() {
        let limiter = ConcurrencyLimiter::new(1, Overflow::Reject);
        let held = limiter.acquire().await.unwrap();
        drop(held);
        assert!(limiter.acquire().await.is_ok());
        assert_eq!(limiter.capacity(), 1);
    }

    #[tokio::test]
    async fn test_queue_mode_times_out() {
        let limiter = ConcurrencyLimiter::new(
            1,
            Overflow::Queue {
                max_waiters: 4,
                max_wait: Duration::from_millis(50),
            },
        );
        let _held = limiter.acquire().await.unwrap();
        let started = tokio::time::Instant::now();
        assert!(limiter.acquire().await.is_err());
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(limiter.waiting(), 0);
    }

    #[tokio::test]
    async fn test_queue_mode_hands_over_slot() {
        let limiter = Arc::new(ConcurrencyLimiter::new(
            1,
            Overflow::Queue {
                max_waiters: 4,
                max_wait: Duration::from_secs(5),
            },
        ));
        let held = limiter.acquire().await.unwrap();
        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_queue_bound_enforced() {
        let limiter = Arc::new(ConcurrencyLimiter::new(
            1,
            Overflow::Queue {
                max_waiters: 1,
                max_wait: Duration::from_secs(5),
            },
        ));
        let _held = limiter.acquire().await.unwrap();
        let first = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await.map(drop) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limiter.waiting(), 1);
        assert!(matches!(
            limiter.acquire().await,
            Err(SandboxError::Backpressure(_))
        ));
        first.abort();
    }
}
