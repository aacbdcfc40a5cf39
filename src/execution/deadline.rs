//! Optional per-execution deadline.
//!
//! An optional wall-clock deadline that, on expiry, stops the scheduler from
//! starting further waves and yields `Suspended` with `missingInputs` left
//! unchanged. `ExecutionDeadline` is the cooperative-cancellation flag the
//! scheduler polls between waves; `CancelHandle` lets a caller outside the
//! scheduler (e.g. a host application's own timeout) cancel early.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A deadline exceeded or was explicitly cancelled.
#[derive(Debug, Clone)]
pub struct DeadlineExceeded {
    pub deadline: Option<Duration>,
    pub elapsed: Duration,
}

impl std::fmt::Display for DeadlineExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.deadline {
            Some(d) => write!(
                f,
                "execution deadline of {d:?} exceeded (ran for {:?})",
                self.elapsed
            ),
            None => write!(f, "execution cancelled after {:?}", self.elapsed),
        }
    }
}

impl std::error::Error for DeadlineExceeded {}

/// Cooperative cancellation controller for a single execution.
///
/// Cloning shares the same underlying flag; the scheduler holds one clone
/// per in-flight execution and calls `check()` between waves.
#[derive(Clone)]
pub struct ExecutionDeadline {
    cancelled: Arc<AtomicBool>,
    start_time: Instant,
    duration: Option<Duration>,
}

impl ExecutionDeadline {
    /// A deadline that expires `duration` after construction, or never if
    /// `duration` is `None`.
    pub fn new(duration: Option<Duration>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            start_time: Instant::now(),
            duration,
        }
    }

    pub fn none() -> Self {
        Self::new(None)
    }

    /// Resolves once the deadline has expired or been explicitly cancelled.
    /// Never resolves if there is no duration and no cancellation.
    pub async fn wait(&self) {
        match self.remaining() {
            None if !self.is_cancelled() => std::future::pending::<()>().await,
            None => {}
            Some(remaining) => {
                tokio::time::sleep(remaining).await;
                self.cancelled.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn check(&self) -> Result<(), DeadlineExceeded> {
        if self.is_cancelled() || self.is_expired() {
            self.cancelled.store(true, Ordering::SeqCst);
            return Err(DeadlineExceeded {
                deadline: self.duration,
                elapsed: self.start_time.elapsed(),
            });
        }
        Ok(())
    }

    fn is_expired(&self) -> bool {
        match self.duration {
            Some(d) => self.start_time.elapsed() >= d,
            None => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.is_expired()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.duration.map(|d| {
            let elapsed = self.start_time.elapsed();
            if elapsed >= d {
                Duration::ZERO
            } else {
                d - elapsed
            }
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

/// Handle to cancel an `ExecutionDeadline` from outside the scheduler.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_never_expires() {
        let d = ExecutionDeadline::none();
        assert!(d.check().is_ok());
        assert_eq!(d.remaining(), None);
    }

    #[test]
    fn cancel_handle_cancels_original() {
        let d = ExecutionDeadline::new(Some(Duration::from_secs(10)));
        let handle = d.cancel_handle();
        handle.cancel();
        assert!(d.is_cancelled());
        assert!(d.check().is_err());
    }

    #[tokio::test]
    async fn deadline_expires_after_duration() {
        let d = ExecutionDeadline::new(Some(Duration::from_millis(5)));
        d.wait().await;
        assert!(d.is_cancelled());
    }
}
