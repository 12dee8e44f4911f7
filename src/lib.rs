pub mod api;
pub mod cli;
pub mod clients;
pub mod config;
pub mod constants;
pub mod library;
pub mod models;
pub mod parser;
pub mod scheduler;
pub mod services;
pub mod state;

use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

use anyhow::Context;
use cli::{Cli, Commands};
pub use config::Config;
use scheduler::RetentionScheduler;
use state::SharedState;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    if cli.command == Some(Commands::Init) {
        return cli::cmd_init(cli.config.as_deref());
    }

    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    init_tracing(&config)?;

    if prometheus_handle.is_some() {
        info!("Prometheus metrics recorder initialized");
    }

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Daemon => run_daemon(config, prometheus_handle).await,
        Commands::Sweep => cli::cmd_sweep(config).await,
        Commands::List { stream } => cli::cmd_list_records(config, &stream).await,
        Commands::Init => Ok(()),
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let (layer, task) = loki_layer(&config.observability.loki_url)?;
        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    Ok(())
}

/// Loki push layer; every stream carries only the `app` label.
fn loki_layer(
    loki_url: &str,
) -> anyhow::Result<(tracing_loki::Layer, tracing_loki::BackgroundTask)> {
    let url = url::Url::parse(loki_url).context("Invalid Loki URL")?;
    let built = tracing_loki::builder()
        .label("app", "dvrvault")?
        .build_url(url)?;
    Ok(built)
}

async fn run_daemon(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "dvrvault v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let shared = Arc::new(SharedState::new(config.clone())?);
    let api_state = api::create_app_state(shared.clone(), prometheus_handle);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = RetentionScheduler::new(
        shared.retention.clone(),
        config.retention.sweep_interval_minutes,
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let server_handle: Option<tokio::task::JoinHandle<()>> = if config.server.enabled {
        let port = config.server.port;
        info!("Starting Web API on port {}", port);

        let app = api::router(api_state);
        let addr = format!("0.0.0.0:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;

        let mut server_shutdown = shutdown_rx;
        Some(tokio::spawn(async move {
            info!("Web Server running at http://0.0.0.0:{}", port);
            let graceful = async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    let _ = shutdown_tx.send(true);
    shared.cover_cache.shutdown();

    if let Err(e) = scheduler_handle.await {
        error!("Retention scheduler task failed: {}", e);
    }
    if let Some(handle) = server_handle
        && let Err(e) = handle.await
    {
        error!("Web server task failed: {}", e);
    }
    info!("Daemon stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_loki_layer_from_config_url() {
        let config = Config::default();
        assert!(loki_layer(&config.observability.loki_url).is_ok());
        assert!(loki_layer("not a url").is_err());
    }
}
