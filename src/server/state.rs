use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoints;

use super::pool::WorkerPool;

#[derive(Clone)]
pub struct ServeState {
    pub(crate) endpoints: Arc<Endpoints>,
    pub(crate) pool: Arc<WorkerPool>,
    pub(crate) shutdown: CancellationToken,
}

impl ServeState {
    pub fn new(
        endpoints: Arc<Endpoints>,
        pool: Arc<WorkerPool>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            endpoints,
            pool,
            shutdown,
        }
    }

    pub fn endpoints(&self) -> &Arc<Endpoints> {
        &self.endpoints
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Fired on graceful shutdown; in-flight handlers answer `Interrupted`.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}
