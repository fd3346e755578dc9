//! Entry point for the `biocage-gateway` HTTP server.
//!
//! Environment:
//! - `BIOCAGE_LISTEN_ADDR`: bind address (default `127.0.0.1:3457`)
//! - `BIOCAGE_IMAGE`: execution image (default `python:3.12-slim`)
//! - `BIOCAGE_BUILD_CONTEXT`: directory to build the image from when absent
//! - `RUST_LOG`: log filter (default `info`)

use std::{path::PathBuf, sync::Arc};

use biocage_executor::{ContainerRuntime, DockerBackend, SandboxConfig};
use biocage_gateway::{create_router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr = std::env::var("BIOCAGE_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:3457".to_owned());

    let mut defaults = SandboxConfig::default();
    if let Ok(image) = std::env::var("BIOCAGE_IMAGE") {
        defaults.image = image;
    }
    defaults.build_context = std::env::var_os("BIOCAGE_BUILD_CONTEXT").map(PathBuf::from);

    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerBackend::with_defaults());
    if let Err(e) = runtime.health_check().await {
        tracing::warn!(
            error = %e,
            "container runtime not ready; sandbox requests will fail until it is"
        );
    }

    let state = AppState::new(runtime, defaults);
    let pool = Arc::clone(&state.pool);
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(addr = %addr, "biocage-gateway listening");

    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await;

    let sandboxes = pool.drain();
    info!(count = sandboxes.len(), "cleaning up sandboxes");
    for sandbox in sandboxes {
        sandbox.lock().await.cleanup().await;
    }

    if let Err(e) = served {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
