//! Streamtap binary: prints every channel event as a JSON line on stdout.
//!
//! Diagnostics go through `tracing` to stderr. Disconnects cleanly on
//! SIGTERM/SIGINT.

use streamtap_server::{load_config, Streamtap};
use streamtap_types::Event;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("STREAMTAP_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("streamtap.toml"));

    let config = load_config(selected_config_path)
        .expect("failed to load configuration: streamtap cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let streamtap = Streamtap::new(&config).expect("invalid configuration: streamtap cannot start");

    // Log events are already mirrored to tracing by the emitter.
    let mut events = streamtap.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::Log { .. }) => {}
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => tracing::error!(error = %err, "failed to serialize event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer lagged; events were dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    match streamtap.connect().await {
        Ok(owners) => {
            tracing::info!(categories = owners.len(), "streamtap connected");
            if config.push.as_ref().is_some_and(|push| push.port.is_none()) {
                tracing::warn!(
                    "push.port is not set: callbacks are only served when the router is mounted by an embedding server"
                );
            }
            shutdown_signal().await;
        }
        Err(err) => tracing::error!(error = %err, "failed to connect"),
    }

    streamtap.disconnect().await;
    printer.abort();
    tracing::info!("streamtap shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, disconnecting"); }
        () = terminate => { tracing::info!("received SIGTERM, disconnecting"); }
    }
}
