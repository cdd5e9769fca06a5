use config::{Config, ConfigError, Environment, File, FileFormat};
use gridcrowd_core::Settings;
use serde::Deserialize;
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const CONFIG_PATH_VAR: &str = "GRIDCROWD_CONFIG";

/// Everything the runner reads at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub settings: Settings,
    #[serde(default)]
    pub runner: RunnerSettings,
}

/// Frame loop pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Frames per second of wall time.
    pub frame_rate: f64,
    /// Stop after this many seconds; `0` runs until every agent arrived.
    pub duration_secs: f64,
    /// Frames between collision reports.
    pub report_every: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self { frame_rate: 60.0, duration_secs: 30.0, report_every: 30 }
    }
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    info!("Attempting to load configuration from {}", path);

    let settings = Config::builder()
        .add_source(File::new(&path, FileFormat::Toml).required(true))
        .add_source(Environment::with_prefix("GRIDCROWD").separator("__").try_parsing(true))
        .build()
        .and_then(Config::try_deserialize::<AppConfig>);

    match settings {
        Ok(config) => {
            info!("Successfully loaded configuration: {:?}", config.runner);
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e)
        }
    }
}
