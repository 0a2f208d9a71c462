//! permitgate library
//!
//! Per-endpoint admission control for a small load-test target service.

pub mod config;
pub mod endpoint;
pub mod errors;
pub mod limiter;
pub mod metrics;
pub mod server;

pub use endpoint::{Endpoint, EndpointConfig, Endpoints, RequestOutcome, ACQUIRE_TIMEOUT};
pub use errors::{AdmissionError, AdmissionResult};
pub use limiter::{Limiter, LimiterPermit};
