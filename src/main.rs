//! Galena server binary: load configuration, rebuild the index registry,
//! and serve the HTTP API until signalled.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

use galena::config::Config;
use galena::core::Registry;
use galena::server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let port = config.server_port;
    info!(data_path = %config.data_path.display(), port, "starting galena");

    let registry = Arc::new(Registry::open(config).context("opening index registry")?);
    let app = build_router(AppState::new(Arc::clone(&registry)));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    info!("flushing indexes");
    registry.close_all().context("closing registry")?;
    Ok(())
}

/// Resolves on the first SIGINT/SIGTERM to begin graceful shutdown. A
/// second signal exits immediately with `128 + signum`.
async fn shutdown_signal() {
    let mut interrupt = signal(SignalKind::interrupt()).expect("installing SIGINT handler");
    let mut terminate = signal(SignalKind::terminate()).expect("installing SIGTERM handler");

    let signum = tokio::select! {
        _ = interrupt.recv() => libc_signum::SIGINT,
        _ = terminate.recv() => libc_signum::SIGTERM,
    };
    info!(signum, "shutdown requested");

    // A second signal skips the graceful path entirely.
    tokio::spawn(async move {
        let mut interrupt = signal(SignalKind::interrupt()).expect("installing SIGINT handler");
        let mut terminate = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
        let signum = tokio::select! {
            _ = interrupt.recv() => libc_signum::SIGINT,
            _ = terminate.recv() => libc_signum::SIGTERM,
        };
        std::process::exit(128 + signum);
    });
}

mod libc_signum {
    pub const SIGINT: i32 = 2;
    pub const SIGTERM: i32 = 15;
}
