use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use petsflow_limits_service::{
    create_router, ApiState, BackendClient, BackendKind, LimitsDatabase, LimitsServiceConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = LimitsServiceConfig::from_env()?;
    init_tracing(&config.log_level)?;

    info!(
        addr = %config.listen_addr(),
        backend = ?config.backend,
        trial_package = %config.trial_limits.package_name,
        "starting limits service"
    );

    let state = match config.backend {
        BackendKind::Sqlite => {
            info!(data_dir = %config.data_dir.display(), "using sqlite backend");
            let database = Arc::new(LimitsDatabase::new(&config.data_dir)?);
            ApiState::new(database, config.clone())
        }
        BackendKind::Rest => {
            let url = config.backend_url.clone().unwrap_or_default();
            let key = config.backend_api_key.clone().unwrap_or_default();
            info!(backend_url = %url, "using rest backend");
            let client = Arc::new(BackendClient::new(url, key, config.backend_timeout())?);
            ApiState::new(client, config.clone())
        }
    };

    let router = create_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("limits service shutting down");
    Ok(())
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
