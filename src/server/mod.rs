mod pool;
mod router;
mod state;

pub use pool::{PoolSlot, WorkerPool};
pub use router::build_router;
pub use state::ServeState;
