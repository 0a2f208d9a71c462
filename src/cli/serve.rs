use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use permitgate::config::{Config, PoolConfig};
use permitgate::endpoint::Endpoints;
use permitgate::metrics;
use permitgate::server::{build_router, ServeState, WorkerPool};
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Address to bind (defaults to config)
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Port to listen on (defaults to config)
    #[arg(long)]
    pub port: Option<u16>,
}

pub fn cmd_serve(args: ServeArgs, ctx: &CliContext) -> Result<()> {
    let mut config = ctx.config().clone();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let runtime = build_runtime(&config.pool)?;
    runtime.block_on(serve(config))
}

fn build_runtime(pool: &PoolConfig) -> Result<Runtime> {
    let prefix = pool.thread_name_prefix.clone();
    let counter = AtomicUsize::new(1);
    let runtime = Builder::new_multi_thread()
        .worker_threads(pool.core_workers.max(1))
        .thread_name_fn(move || format!("{prefix}{}", counter.fetch_add(1, Ordering::Relaxed)))
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    info!(
        core_workers = pool.core_workers,
        max_workers = pool.max_workers,
        queue_capacity = pool.queue_capacity,
        "Worker pool configured"
    );
    Ok(runtime)
}

async fn serve(config: Config) -> Result<()> {
    let endpoints = Arc::new(Endpoints::standard());
    for endpoint in endpoints.iter() {
        let binding = endpoint.config();
        info!(
            method = %binding.method,
            path = binding.path,
            capacity = binding.capacity,
            work_ms = binding.work_duration.as_millis() as u64,
            "endpoint gated"
        );
    }

    let _metrics_server = metrics::spawn_metrics_server(config.metrics_port, Arc::clone(&endpoints));
    let pool = Arc::new(WorkerPool::from_config(&config.pool));
    let shutdown = CancellationToken::new();
    let state = ServeState::new(endpoints, pool, shutdown.clone());
    let router = build_router(state);

    let addr = config.server.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind server on {}", addr))?;
    info!("permitgate listening on http://{}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
    .context("server exited unexpectedly")?;
    info!("permitgate stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested; interrupting in-flight requests"),
        Err(err) => {
            error!(?err, "failed to listen for shutdown signal");
            warn!("Serving without graceful shutdown");
            std::future::pending::<()>().await;
        }
    }
    shutdown.cancel();
}
