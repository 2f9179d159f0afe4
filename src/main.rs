use std::sync::Arc;

use alarm_bridge::{Bridge, BridgeHandle, TomlFileStore, TracingHost};
use color_eyre::{eyre::eyre, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let store = TomlFileStore::open(TomlFileStore::default_path())
        .await
        .map_err(|e| eyre!("Failed to open settings: {}", e))?;
    info!("Using settings file {}", store.path().display());

    let bridge = Bridge::new(Box::new(store), Arc::new(TracingHost));
    let cancel = CancellationToken::new();
    let (_handle, task) = BridgeHandle::spawn(bridge, cancel.clone());

    let reason = wait_for_shutdown().await?;
    warn!("{} received, shutting down", reason);
    cancel.cancel();
    task.await
        .map_err(|e| eyre!("Bridge task failed: {}", e))?;

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Ok("SIGINT")
        }
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}
