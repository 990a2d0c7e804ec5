//! Dependency injection container for grelwater.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::config::Config;
use super::entry::{ConfigEntry, EntryFile};
use crate::integration::{homeassistant, saur};
use crate::services::coordinator::Coordinator;
use crate::services::statistics::StatisticsPublisher;
use crate::storage::{self, Store};

/// Container for application dependencies.
pub struct Container {
    config: Arc<Config>,
    saur: Arc<saur::Client>,
    homeassistant: Arc<homeassistant::Client>,
    publisher: Arc<StatisticsPublisher>,
    entry_file: EntryFile,
}

impl Container {
    /// Creates a new instance of the dependency injection container.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let saur = Arc::new(saur::Client::new(
            config.saur_url.clone(),
            config.saur_login.clone(),
            config.saur_password.clone(),
            config.saur_section_id.clone(),
        ));

        let homeassistant = Arc::new(homeassistant::Client::new(
            config.homeassistant_url.clone(),
            config.homeassistant_token.clone(),
        ));

        let publisher = Arc::new(StatisticsPublisher::new(
            Arc::clone(&homeassistant),
            config.statistic_namespace.clone(),
        ));

        let entry_file = EntryFile::in_dir(&config.data_dir);

        Self {
            config,
            saur,
            homeassistant,
            publisher,
            entry_file,
        }
    }

    /// Returns a reference to the application config.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a reference to the SAUR client.
    pub fn saur_client(&self) -> Arc<saur::Client> {
        Arc::clone(&self.saur)
    }

    /// Returns a reference to the HomeAssistant client.
    pub fn homeassistant_client(&self) -> Arc<homeassistant::Client> {
        Arc::clone(&self.homeassistant)
    }

    /// Returns a reference to the statistics publisher.
    pub fn statistics_publisher(&self) -> Arc<StatisticsPublisher> {
        Arc::clone(&self.publisher)
    }

    pub fn entry_file(&self) -> &EntryFile {
        &self.entry_file
    }

    /// Open the store of the entry's section and build its coordinator.
    pub async fn coordinator(
        &self,
        entry: ConfigEntry,
        cancel: CancellationToken,
    ) -> Result<Coordinator, storage::Error> {
        let path = Store::path_for(&self.config.data_dir, &entry.section_id);
        let store = Store::open_at(path).await?;
        Ok(Coordinator::new(
            self.saur_client(),
            store,
            self.statistics_publisher(),
            self.config.coordinator_settings(),
            entry,
            self.entry_file.clone(),
            cancel,
        ))
    }

    /// Shutdown the container and clean up resources.
    pub async fn shutdown(&self) {
        self.saur.close().await;
    }
}
