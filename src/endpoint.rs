//! Endpoint bindings: one [`Limiter`] per route plus a fixed simulated delay.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::MethodFilter;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AdmissionError;
use crate::limiter::{Limiter, LimiterPermit};
use crate::metrics;

/// Shared acquire window for every endpoint.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(1);

const REQUEST_ID_LEN: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EndpointMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl EndpointMethod {
    pub fn filter(self) -> MethodFilter {
        match self {
            EndpointMethod::Get => MethodFilter::GET,
            EndpointMethod::Post => MethodFilter::POST,
            EndpointMethod::Put => MethodFilter::PUT,
            EndpointMethod::Delete => MethodFilter::DELETE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EndpointMethod::Get => "GET",
            EndpointMethod::Post => "POST",
            EndpointMethod::Put => "PUT",
            EndpointMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for EndpointMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static marker added to an endpoint's success body as `<key>: true`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFlag {
    Bottleneck,
    Complete,
}

impl ResponseFlag {
    pub fn key(self) -> &'static str {
        match self {
            ResponseFlag::Bottleneck => "bottleneck",
            ResponseFlag::Complete => "complete",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    pub name: &'static str,
    pub method: EndpointMethod,
    pub path: &'static str,
    pub capacity: usize,
    pub work_duration: Duration,
    pub acquire_timeout: Duration,
    pub flag: Option<ResponseFlag>,
}

impl EndpointConfig {
    pub const fn new(
        name: &'static str,
        method: EndpointMethod,
        path: &'static str,
        capacity: usize,
        work_millis: u64,
    ) -> Self {
        Self {
            name,
            method,
            path,
            capacity,
            work_duration: Duration::from_millis(work_millis),
            acquire_timeout: ACQUIRE_TIMEOUT,
            flag: None,
        }
    }

    pub const fn with_flag(mut self, flag: ResponseFlag) -> Self {
        self.flag = Some(flag);
        self
    }

    pub const fn with_work_duration(mut self, work_duration: Duration) -> Self {
        self.work_duration = work_duration;
        self
    }

    pub const fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Key used by the status report, e.g. `api3`.
    pub fn status_key(&self) -> String {
        format!("api{}", self.name)
    }

    /// Label used in log lines, e.g. `API-3`.
    pub fn log_label(&self) -> String {
        format!("API-{}", self.name)
    }
}

pub const API_1: EndpointConfig = EndpointConfig::new("1", EndpointMethod::Get, "/api/1", 1000, 50);
pub const API_2: EndpointConfig =
    EndpointConfig::new("2", EndpointMethod::Post, "/api/2", 1000, 50);
pub const API_3: EndpointConfig = EndpointConfig::new("3", EndpointMethod::Put, "/api/3", 200, 100)
    .with_flag(ResponseFlag::Bottleneck);
pub const API_4: EndpointConfig =
    EndpointConfig::new("4", EndpointMethod::Delete, "/api/4", 600, 50)
        .with_flag(ResponseFlag::Complete);

pub fn standard_configs() -> [EndpointConfig; 4] {
    [API_1, API_2, API_3, API_4]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    Accepted { request_id: String, available: usize },
    Rejected { request_id: String },
    Faulted { request_id: String },
}

impl RequestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RequestOutcome::Accepted { .. } => "accepted",
            RequestOutcome::Rejected { .. } => "rejected",
            RequestOutcome::Faulted { .. } => "faulted",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, RequestOutcome::Accepted { .. })
    }
}

pub fn new_request_id() -> String {
    let mut id = Uuid::new_v4().to_string();
    id.truncate(REQUEST_ID_LEN);
    id
}

#[derive(Debug)]
pub struct Endpoint {
    config: EndpointConfig,
    limiter: Limiter,
}

impl Endpoint {
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            limiter: Limiter::new(config.capacity),
            config,
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    /// Runs one request through the gate. The permit, if taken, is dropped
    /// before this returns, whatever the outcome.
    pub async fn handle(&self, cancel: &CancellationToken) -> RequestOutcome {
        let request_id = new_request_id();
        let label = self.config.log_label();

        let permit = match self
            .limiter
            .try_acquire_until_cancelled(self.config.acquire_timeout, cancel)
            .await
        {
            Ok(permit) => TrackedPermit::new(self, permit),
            Err(AdmissionError::TooManyRequests) => {
                warn!(request_id = %request_id, "{label} rejected");
                return self.finish(RequestOutcome::Rejected { request_id });
            }
            Err(err) => {
                error!(request_id = %request_id, %err, "{label} interrupted while waiting");
                return self.finish(RequestOutcome::Faulted { request_id });
            }
        };
        let available = self.limiter.available_permits();

        let worked = self.simulate_work(cancel).await;
        drop(permit);

        match worked {
            Ok(()) => {
                info!(request_id = %request_id, available, "{label} success");
                self.finish(RequestOutcome::Accepted {
                    request_id,
                    available,
                })
            }
            Err(err) => {
                error!(request_id = %request_id, %err, "{label} interrupted during work");
                self.finish(RequestOutcome::Faulted { request_id })
            }
        }
    }

    fn publish_in_use(&self) {
        metrics::set_permits_in_use(self.config.name, self.limiter.in_use());
    }

    /// Stand-in for real processing: a fixed sleep, nothing more.
    async fn simulate_work(&self, cancel: &CancellationToken) -> Result<(), AdmissionError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AdmissionError::Interrupted),
            _ = sleep(self.config.work_duration) => Ok(()),
        }
    }

    fn finish(&self, outcome: RequestOutcome) -> RequestOutcome {
        metrics::record_outcome(self.config.name, outcome.label());
        outcome
    }

    pub fn respond(&self, outcome: RequestOutcome) -> Response {
        match outcome {
            RequestOutcome::Accepted {
                request_id,
                available,
            } => {
                let mut body = json!({
                    "api": self.config.name,
                    "requestId": request_id,
                    "available": available,
                });
                if let (Some(flag), Value::Object(map)) = (self.config.flag, &mut body) {
                    map.insert(flag.key().to_string(), Value::Bool(true));
                }
                (StatusCode::OK, Json(body)).into_response()
            }
            RequestOutcome::Rejected { .. } => AdmissionError::TooManyRequests.into_response(),
            RequestOutcome::Faulted { .. } => AdmissionError::Interrupted.into_response(),
        }
    }
}

/// Wraps a held permit so the in-use gauge moves on acquire and on release,
/// including when the handler future is dropped mid-request.
struct TrackedPermit<'a> {
    endpoint: &'a Endpoint,
    permit: Option<LimiterPermit>,
}

impl<'a> TrackedPermit<'a> {
    fn new(endpoint: &'a Endpoint, permit: LimiterPermit) -> Self {
        endpoint.publish_in_use();
        Self {
            endpoint,
            permit: Some(permit),
        }
    }
}

impl Drop for TrackedPermit<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.endpoint.publish_in_use();
    }
}

/// The composed set of endpoints. Built once at startup and handed to the
/// server state; each entry owns its own limiter.
#[derive(Debug, Default)]
pub struct Endpoints {
    entries: Vec<Arc<Endpoint>>,
}

impl Endpoints {
    pub fn standard() -> Self {
        Self::from_configs(standard_configs())
    }

    pub fn from_configs(configs: impl IntoIterator<Item = EndpointConfig>) -> Self {
        Self {
            entries: configs
                .into_iter()
                .map(|config| Arc::new(Endpoint::new(config)))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Endpoint>> {
        self.entries
            .iter()
            .find(|endpoint| endpoint.config().name == name)
    }

    /// Capacity and current availability per endpoint, keyed `api<N>`.
    pub fn status(&self) -> serde_json::Map<String, Value> {
        self.entries
            .iter()
            .map(|endpoint| {
                let limiter = endpoint.limiter();
                (
                    endpoint.config().status_key(),
                    json!({
                        "max": limiter.capacity(),
                        "available": limiter.available_permits(),
                    }),
                )
            })
            .collect()
    }
}
