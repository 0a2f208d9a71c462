//! Bounded counting semaphore with a timed acquire.
//!
//! A [`Limiter`] hands out at most `capacity` permits. Acquisition waits in
//! FIFO order for at most the caller's window; the returned [`LimiterPermit`]
//! gives its permit back when dropped, so a held permit is released on every
//! exit path, including cancellation of the owning future.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::errors::{AdmissionError, AdmissionResult};

#[derive(Clone, Debug)]
pub struct Limiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl Limiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of free permits. Racy under load; use for reporting only.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available_permits())
    }

    /// Takes a permit if one is free right now.
    pub fn try_acquire_now(&self) -> AdmissionResult<LimiterPermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(LimiterPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(AdmissionError::TooManyRequests),
            Err(TryAcquireError::Closed) => Err(AdmissionError::Interrupted),
        }
    }

    /// Waits up to `wait` for a permit. A zero window is a single
    /// non-blocking attempt.
    pub async fn try_acquire(&self, wait: Duration) -> AdmissionResult<LimiterPermit> {
        if wait.is_zero() {
            return self.try_acquire_now();
        }

        match timeout(wait, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(LimiterPermit { _permit: permit }),
            Ok(Err(_closed)) => Err(AdmissionError::Interrupted),
            Err(_elapsed) => Err(AdmissionError::TooManyRequests),
        }
    }

    /// Same as [`Limiter::try_acquire`], but gives up with
    /// [`AdmissionError::Interrupted`] as soon as `cancel` fires. An aborted
    /// wait never consumes a permit.
    pub async fn try_acquire_until_cancelled(
        &self,
        wait: Duration,
        cancel: &CancellationToken,
    ) -> AdmissionResult<LimiterPermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AdmissionError::Interrupted),
            result = self.try_acquire(wait) => result,
        }
    }
}

/// One held permit. Dropping it is the release.
#[derive(Debug)]
#[must_use = "the permit is released as soon as it is dropped"]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}
