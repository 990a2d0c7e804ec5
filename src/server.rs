//! Server
use anyhow::{Context, anyhow};
use tokio_util::sync::CancellationToken;

use crate::core::config::{APP_NAME, APP_VERSION, Config};
use crate::core::container::Container;
use crate::services::setup;

/// Run the server with the given configuration and shutdown token
pub async fn server(config: Config, shutdown_token: CancellationToken) -> anyhow::Result<()> {
    let container = Container::new(config);
    log::info!("{APP_NAME} v{APP_VERSION} started");
    let result = run(&container, shutdown_token).await;
    container.shutdown().await;
    result
}

/// Ensure the account entry, bootstrap the coordinator and run it until cancelled.
async fn run(container: &Container, shutdown_token: CancellationToken) -> anyhow::Result<()> {
    let config = container.config();
    let saur = container.saur_client();

    let entry = tokio::select! {
        _ = shutdown_token.cancelled() => return Ok(()),
        entry = setup::ensure_entry(
            &saur,
            &config.saur_login,
            &config.saur_password,
            container.entry_file(),
        ) => entry.map_err(|e| anyhow!("Setup failed with '{}': {e}", e.code()))?,
    };

    let mut coordinator = container
        .coordinator(entry, shutdown_token.clone())
        .await
        .context("Cannot open the local store")?;

    tokio::select! {
        _ = shutdown_token.cancelled() => return Ok(()),
        bootstrap = coordinator.first_refresh() => {
            bootstrap.context("Coordinator bootstrap failed")?;
        }
    }

    coordinator.run().await;
    Ok(())
}
