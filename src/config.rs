use std::path::PathBuf;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

const SYSTEM_CONFIG_PATH: &str = "/etc/ingestd/config.toml";
const LOCAL_CONFIG_PATH: &str = "ingestd.toml";
const ENV_PREFIX: &str = "INGESTD_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub destination_root: PathBuf,
    pub archive_root: PathBuf,
    pub database_path: PathBuf,
    pub poll_interval_secs: u64,
    pub settle_delay_ms: u64,
    pub boot_volume_label: String,
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            destination_root: PathBuf::from("./dest"),
            archive_root: PathBuf::from("./_archive"),
            database_path: PathBuf::from("ingestd.db"),
            poll_interval_secs: 5,
            settle_delay_ms: 1500,
            boot_volume_label: "EFI".to_string(),
            simulation: false,
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Layer defaults, config files, `INGESTD_*` environment variables and
    /// finally any CLI overrides (later layers win).
    pub fn new<T: Serialize>(cli_args: Option<&T>) -> Result<Self> {
        Self::figment(cli_args)
            .extract()
            .context("Failed to load configuration")
    }

    fn figment<T: Serialize>(cli_args: Option<&T>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(SYSTEM_CONFIG_PATH))
            .merge(Toml::file(LOCAL_CONFIG_PATH))
            .merge(Env::prefixed(ENV_PREFIX));

        if let Some(args) = cli_args {
            figment = figment.merge(Serialized::defaults(args));
        }

        figment
    }
}
