//! Deadline and cancellation for blocking read loops.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Why a guarded operation stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The deadline elapsed.
    TimedOut(Duration),
    /// The cancellation token fired.
    Cancelled,
}

/// Bounds a read loop by an optional deadline and an optional cancellation
/// token.
///
/// With neither set, [`ReadGuard::run`] simply awaits the operation, which
/// may never complete if the remote never produces matching output.
#[derive(Debug, Clone, Default)]
pub struct ReadGuard {
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl ReadGuard {
    /// A guard that never interrupts.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A guard that interrupts after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    /// Set or clear the deadline.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a cancellation token.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The configured deadline.
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout
    }

    /// Drive `operation` to completion unless the deadline passes or the
    /// token is cancelled first.
    pub async fn run<F, T>(&self, operation: F) -> Result<T, Interrupt>
    where
        F: Future<Output = T>,
    {
        let bounded = async {
            match self.timeout {
                Some(after) => tokio::time::timeout(after, operation)
                    .await
                    .map_err(|_| Interrupt::TimedOut(after)),
                None => Ok(operation.await),
            }
        };

        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(Interrupt::Cancelled),
                result = bounded => result,
            },
            None => bounded.await,
        }
    }
}
