mod bootstrap;
mod health;
mod webhook;

use std::future::{Future, IntoFuture};
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use moldquote_core::config::{AppConfig, LoadOptions};

use crate::webhook::WebhookState;

fn init_logging(config: &AppConfig) {
    use moldquote_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = Router::new()
        .merge(webhook::router(WebhookState::new(app.dispatcher.clone(), app.verifier.clone())))
        .merge(health::router(app.persistence_probe()));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        sink = app.service.sink_name(),
        "moldquote-server listening"
    );

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let serve = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_trigger(wait_for_shutdown(), stop_tx));

    let drain_deadline = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    tokio::select! {
        result = serve.into_future() => result?,
        _ = async {
            let _ = stop_rx.wait_for(|stopping| *stopping).await;
            tokio::time::sleep(drain_deadline).await;
        } => {
            tracing::warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                "in-flight requests did not finish before the drain deadline"
            );
        }
    }

    if let Some(pool) = &app.db_pool {
        pool.close().await;
    }
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "moldquote-server stopped"
    );

    Ok(())
}

/// Completes once `signal` fires and flags the drain watcher. A signal listener
/// that cannot be installed never completes, so the server keeps running.
async fn shutdown_trigger(
    signal: impl Future<Output = std::io::Result<()>>,
    stop_tx: tokio::sync::watch::Sender<bool>,
) {
    if let Err(error) = signal.await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    let _ = stop_tx.send(true);
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform sends one.
async fn wait_for_shutdown() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use tokio::sync::watch;
    use tokio::time::timeout;

    use super::shutdown_trigger;

    #[tokio::test]
    async fn shutdown_signal_flags_drain_watcher() {
        let (stop_tx, stop_rx) = watch::channel(false);

        timeout(Duration::from_secs(1), shutdown_trigger(async { Ok(()) }, stop_tx))
            .await
            .expect("trigger should complete");

        assert!(*stop_rx.borrow());
    }

    #[tokio::test]
    async fn failed_signal_listener_keeps_server_running() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let failing = async { Err(io::Error::other("no signal driver")) };

        let finished = timeout(Duration::from_millis(50), shutdown_trigger(failing, stop_tx)).await;

        assert!(finished.is_err(), "shutdown must not fire without a signal");
        assert!(!*stop_rx.borrow());
    }
}
