//! Outer worker pool: bounds in-flight requests and the backlog waiting for a
//! worker slot, above the per-endpoint limiters.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

use crate::config::PoolConfig;
use crate::errors::{AdmissionError, AdmissionResult};
use crate::metrics;

#[derive(Debug)]
pub struct WorkerPool {
    workers: Arc<Semaphore>,
    admitted: Arc<Semaphore>,
    max_workers: usize,
    queue_capacity: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize, queue_capacity: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            workers: Arc::new(Semaphore::new(max_workers)),
            admitted: Arc::new(Semaphore::new(max_workers + queue_capacity)),
            max_workers,
            queue_capacity,
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.max_workers, config.queue_capacity)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn in_flight(&self) -> usize {
        self.max_workers - self.workers.available_permits()
    }

    /// Requests holding a backlog slot but still waiting for a worker.
    pub fn queued(&self) -> usize {
        let admitted = self.max_workers + self.queue_capacity - self.admitted.available_permits();
        admitted.saturating_sub(self.in_flight())
    }

    /// Takes a backlog slot immediately or sheds, then waits in FIFO order for
    /// a worker slot.
    pub async fn admit(&self) -> AdmissionResult<PoolSlot> {
        let ticket = self
            .admitted
            .clone()
            .try_acquire_owned()
            .map_err(|_| AdmissionError::Overloaded)?;
        let worker = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AdmissionError::Overloaded)?;
        Ok(PoolSlot {
            _worker: worker,
            _ticket: ticket,
        })
    }
}

#[derive(Debug)]
pub struct PoolSlot {
    _worker: OwnedSemaphorePermit,
    _ticket: OwnedSemaphorePermit,
}

pub(crate) async fn worker_pool_middleware(
    State(pool): State<Arc<WorkerPool>>,
    request: Request,
    next: Next,
) -> Response {
    let slot = match pool.admit().await {
        Ok(slot) => slot,
        Err(err) => {
            metrics::record_shed();
            warn!(
                max_workers = pool.max_workers(),
                queue_capacity = pool.queue_capacity(),
                path = %request.uri().path(),
                "worker pool backlog full; shedding request"
            );
            return err.into_response();
        }
    };
    let response = next.run(request).await;
    drop(slot);
    response
}
