use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::Deserialize;
use thiserror::Error;

use tdx_core::constants::{DEFAULT_CORE_VERSION, DEFAULT_DEVICE_KEY, DEFAULT_MAIN_VERSION};

pub(crate) const DEFAULT_CONFIG_PATH: &str = "configure.toml";
pub(crate) const DEFAULT_DATA_HOST: &str = "119.147.212.81:7709";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config file: {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub(crate) app: AppConfig,
    pub(crate) tdx: TdxConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) data_path: PathBuf,
    pub(crate) logger: LoggerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./data/"),
            logger: LoggerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct LoggerConfig {
    pub(crate) level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct TdxConfig {
    pub(crate) server: ServerConfig,
    pub(crate) files: FilesConfig,
    pub(crate) client: ClientConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ServerConfig {
    pub(crate) data_host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_host: DEFAULT_DATA_HOST.to_string(),
        }
    }
}

/// Имена файлов и каталогов относительно `app.data_path`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct FilesConfig {
    pub(crate) calendar: String,
    pub(crate) stock_list: String,
    pub(crate) stock_bonus: String,
    pub(crate) stock_day: String,
    pub(crate) stock_min: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            calendar: "calendar.csv".to_string(),
            stock_list: "stock_list.csv".to_string(),
            stock_bonus: "stock_bonus.csv".to_string(),
            stock_day: "days/".to_string(),
            stock_min: "mins/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ClientConfig {
    pub(crate) main_version: f32,
    pub(crate) core_version: f32,
    pub(crate) device_key: String,
    /// таймаут чтения сокета = период проверки shutdown
    pub(crate) read_tick_ms: u64,
    pub(crate) connect_timeout_s: u64,
    pub(crate) completion_timeout_s: u64,
    pub(crate) ack_timeout_s: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            main_version: DEFAULT_MAIN_VERSION,
            core_version: DEFAULT_CORE_VERSION,
            device_key: String::from_utf8_lossy(DEFAULT_DEVICE_KEY).into_owned(),
            read_tick_ms: 200,
            connect_timeout_s: 10,
            completion_timeout_s: 600,
            ack_timeout_s: 60,
        }
    }
}

impl ClientConfig {
    pub(crate) fn read_tick(&self) -> Duration {
        Duration::from_millis(self.read_tick_ms.max(1))
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_s)
    }

    pub(crate) fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_s)
    }

    pub(crate) fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_s)
    }
}

impl Config {
    /// Читает TOML. Если файла нет - значения по умолчанию.
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("config {path:?} not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub(crate) fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub(crate) fn calendar_path(&self) -> PathBuf {
        self.app.data_path.join(&self.tdx.files.calendar)
    }

    pub(crate) fn stock_list_path(&self) -> PathBuf {
        self.app.data_path.join(&self.tdx.files.stock_list)
    }

    pub(crate) fn stock_bonus_path(&self) -> PathBuf {
        self.app.data_path.join(&self.tdx.files.stock_bonus)
    }

    pub(crate) fn stock_day_dir(&self) -> PathBuf {
        self.app.data_path.join(&self.tdx.files.stock_day)
    }

    pub(crate) fn stock_min_dir(&self) -> PathBuf {
        self.app.data_path.join(&self.tdx.files.stock_min)
    }
}
