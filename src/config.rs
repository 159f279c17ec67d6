use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::core::admission::DEFAULT_MAX_CAPACITY;
use crate::core::layout::LabelCollision;
use crate::core::transfer_engine::TransferEngineType;

pub const CONFIG_PATH: &str = "/etc/volarchd/config.toml";
const ENV_PREFIX: &str = "VOLARCHD_";

/// What the poll loop does when a volume or the enumeration fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Any error ends the process.
    #[default]
    Abort,
    /// Log the failed volume (or empty enumeration) and keep polling.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub destination_root: PathBuf,
    pub poll_interval_ms: u64,
    pub max_capacity_bytes: u64,
    pub label_collision: LabelCollision,
    pub failure_policy: FailurePolicy,
    pub transfer_engine: TransferEngineType,
    pub preserve_timestamps: bool,
    pub sync_files: bool,
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            destination_root: PathBuf::from("usb_data"),
            poll_interval_ms: 500,
            max_capacity_bytes: DEFAULT_MAX_CAPACITY,
            label_collision: LabelCollision::default(),
            failure_policy: FailurePolicy::default(),
            transfer_engine: TransferEngineType::default(),
            preserve_timestamps: true,
            sync_files: false,
            simulation: false,
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Layer defaults, the config file, `VOLARCHD_*` env vars and CLI overrides,
    /// later sources winning.
    pub fn new<T: Serialize>(config_file: Option<&Path>, cli_args: Option<&T>) -> Result<Self> {
        let config_file = config_file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("VOLARCHD_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(CONFIG_PATH));

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]));

        if let Some(args) = cli_args {
            figment = figment.merge(Serialized::defaults(args));
        }

        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.destination_root.as_os_str().is_empty() {
            bail!("destination_root must not be empty");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
