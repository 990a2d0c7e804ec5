//! Application configuration loaded from environment variables.
use std::path::PathBuf;

use envconfig::Envconfig;
use humantime::Duration;
use reqwest::Url;

use crate::services::coordinator::Settings;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Envconfig)]
pub struct Config {
    #[allow(dead_code)]
    #[envconfig(from = "APP_LOG", default = "error")]
    pub app_log: String,
    #[allow(dead_code)]
    #[envconfig(from = "APP_LOG_STYLE", default = "always")]
    pub app_log_style: String,
    #[envconfig(from = "SAUR_URL", default = "https://apib2c.azure.saurclient.fr")]
    pub saur_url: Url,
    #[envconfig(from = "SAUR_LOGIN")]
    pub saur_login: String,
    #[envconfig(from = "SAUR_PASSWORD")]
    pub saur_password: String,
    #[envconfig(from = "SAUR_SECTION_ID")]
    pub saur_section_id: Option<String>,
    #[envconfig(from = "HOMEASSISTANT_URL")]
    pub homeassistant_url: Url,
    #[envconfig(from = "HOMEASSISTANT_TOKEN")]
    pub homeassistant_token: String,
    #[envconfig(from = "DATA_DIR", default = "data")]
    pub data_dir: PathBuf,
    #[envconfig(from = "POLLING_INTERVAL", default = "24h")]
    pub polling_interval: Duration,
    #[envconfig(from = "UPDATE_DEBOUNCE", default = "30s")]
    pub update_debounce: Duration,
    #[envconfig(from = "PROBE_DELAY_MIN", default = "8s")]
    pub probe_delay_min: Duration,
    #[envconfig(from = "PROBE_DELAY_MAX", default = "35s")]
    pub probe_delay_max: Duration,
    #[envconfig(from = "STATISTIC_NAMESPACE", default = "sensor.saur_water")]
    pub statistic_namespace: String,
}

impl Config {
    /// Coordinator timings.
    pub fn coordinator_settings(&self) -> Settings {
        Settings {
            polling_interval: self.polling_interval.into(),
            update_debounce: self.update_debounce.into(),
            probe_delay_min: self.probe_delay_min.into(),
            probe_delay_max: self.probe_delay_max.into(),
        }
    }
}

pub fn configure_logger() {
    let env = env_logger::Env::default()
        .filter_or("APP_LOG", "info")
        .write_style_or("APP_LOG_STYLE", "always");
    env_logger::init_from_env(env);
}
