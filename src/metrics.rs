use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{
    core::Collector, Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info};

use crate::endpoint::Endpoints;

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();

static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "permitgate_requests_total",
            "Gated requests by endpoint and outcome",
        ),
        &["api", "outcome"],
    )
    .expect("valid requests_total definition")
});

static PERMITS_AVAILABLE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "permitgate_permits_available",
            "Free permits per endpoint at scrape time",
        ),
        &["api"],
    )
    .expect("valid permits_available definition")
});

static PERMITS_IN_USE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "permitgate_permits_in_use",
            "Permits currently held per endpoint",
        ),
        &["api"],
    )
    .expect("valid permits_in_use definition")
});

static PERMITS_MAX: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("permitgate_permits_max", "Configured permits per endpoint"),
        &["api"],
    )
    .expect("valid permits_max definition")
});

static POOL_SHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "permitgate_pool_shed_total",
        "Requests shed because the worker pool backlog was full",
    )
    .expect("valid pool_shed_total definition")
});

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register permitgate metric");
        }
    }
}

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        register(registry, REQUESTS_TOTAL.clone());
        register(registry, PERMITS_AVAILABLE.clone());
        register(registry, PERMITS_IN_USE.clone());
        register(registry, PERMITS_MAX.clone());
        register(registry, POOL_SHED_TOTAL.clone());
    });
}

pub fn record_outcome(api: &str, outcome: &str) {
    REQUESTS_TOTAL.with_label_values(&[api, outcome]).inc();
}

pub fn record_shed() {
    POOL_SHED_TOTAL.inc();
}

pub fn outcome_count(api: &str, outcome: &str) -> u64 {
    REQUESTS_TOTAL.with_label_values(&[api, outcome]).get()
}

pub fn shed_count() -> u64 {
    POOL_SHED_TOTAL.get()
}

/// Called whenever an endpoint takes or returns a permit.
pub fn set_permits_in_use(api: &str, in_use: usize) {
    PERMITS_IN_USE.with_label_values(&[api]).set(in_use as i64);
}

pub fn permits_in_use(api: &str) -> i64 {
    PERMITS_IN_USE.with_label_values(&[api]).get()
}

/// Copies the live limiter counters into the permit gauges.
pub fn refresh_permit_gauges(endpoints: &Endpoints) {
    for endpoint in endpoints.iter() {
        let api = endpoint.config().name;
        let limiter = endpoint.limiter();
        PERMITS_AVAILABLE
            .with_label_values(&[api])
            .set(limiter.available_permits() as i64);
        set_permits_in_use(api, limiter.in_use());
        PERMITS_MAX
            .with_label_values(&[api])
            .set(limiter.capacity() as i64);
    }
}

/// Text exposition of the registry after a gauge refresh.
pub fn render(endpoints: &Endpoints) -> anyhow::Result<(String, String)> {
    register_metrics();
    refresh_permit_gauges(endpoints);
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&global_registry().gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), String::from_utf8(buffer)?))
}

pub fn spawn_metrics_server(port: u16, endpoints: Arc<Endpoints>) -> Option<JoinHandle<()>> {
    if port == 0 {
        return None;
    }

    register_metrics();
    let app = metrics_router(endpoints);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(%addr, "metrics server listening");
    Some(tokio::spawn(async move {
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(err) = axum::serve(listener, app.into_make_service()).await {
                    error!(?err, "metrics server exited with error");
                }
            }
            Err(err) => {
                error!(?err, "failed to bind metrics listener");
            }
        }
    }))
}

pub fn metrics_router(endpoints: Arc<Endpoints>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(endpoints)
}

async fn metrics_handler(State(endpoints): State<Arc<Endpoints>>) -> Response {
    match render(&endpoints) {
        Ok((format_type, body)) => match HeaderValue::from_str(&format_type) {
            Ok(value) => ([(axum::http::header::CONTENT_TYPE, value)], body).into_response(),
            Err(err) => {
                error!(?err, "failed to build content-type header");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "metric encode error",
                )
                    .into_response()
            }
        },
        Err(err) => {
            error!(?err, "failed to encode prometheus metrics");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "metric encode error",
            )
                .into_response()
        }
    }
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}
