use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::CoreError;
use crate::providers::cafef::STOCK_NAMES;
use crate::providers::util::RetryPolicy;
use crate::providers::{alphavantage, cafef, coingecko, pnj};
use crate::services::scheduler::ScheduleSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub coingecko_base_url: String,
    pub cafef_base_url: String,
    /// Pause between CafeF requests
    pub cafef_delay_ms: u64,
    pub yahoo_enabled: bool,
    pub alphavantage_base_url: String,
    pub alphavantage_api_key: Option<String>,
    /// Pause between Alpha Vantage requests (free tier allows 5/min)
    pub alphavantage_delay_ms: u64,
    pub pnj_url: String,
    pub retry: RetryPolicy,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            coingecko_base_url: coingecko::DEFAULT_BASE_URL.to_string(),
            cafef_base_url: cafef::DEFAULT_BASE_URL.to_string(),
            cafef_delay_ms: 200,
            yahoo_enabled: true,
            alphavantage_base_url: alphavantage::DEFAULT_BASE_URL.to_string(),
            alphavantage_api_key: None,
            alphavantage_delay_ms: 12_000,
            pnj_url: pnj::DEFAULT_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Stock symbols priced from the domestic board; every other held stock
    /// is treated as foreign.
    pub domestic_stocks: Vec<String>,
    /// Age after which `errorLogs` and `deadLetters` entries are deleted
    pub error_retention_months: u32,
    pub audit_retention_months: u32,
    /// Maximum deletes per committed batch
    pub cleanup_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            domestic_stocks: STOCK_NAMES.iter().map(|(sym, _)| sym.to_string()).collect(),
            error_retention_months: 1,
            audit_retention_months: 3,
            cleanup_batch_size: 500,
        }
    }
}

impl SyncConfig {
    pub fn is_domestic(&self, symbol: &str) -> bool {
        self.domestic_stocks
            .iter()
            .any(|s| s.eq_ignore_ascii_case(symbol))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Argon2 PHC strings of accepted admin tokens
    pub token_hashes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Environment variable holding the snapshot password
    pub password_env: String,
    pub file_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            password_env: "COUPLES_FINANCE_PASSWORD".to_string(),
            file_name: "store.cfds".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_path: Option<String>,
    pub currency: String,
    pub providers: ProvidersConfig,
    pub sync: SyncConfig,
    pub schedule: ScheduleSettings,
    pub admin: AdminConfig,
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            currency: "VND".to_string(),
            providers: ProvidersConfig::default(),
            sync: SyncConfig::default(),
            schedule: ScheduleSettings::default(),
            admin: AdminConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

fn project_dirs() -> Result<ProjectDirs, CoreError> {
    ProjectDirs::from("vn", "couples-finance", "couples-finance")
        .ok_or_else(|| CoreError::Config("Could not determine project directories".into()))
}

impl AppConfig {
    /// Load from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        match path {
            Some(p) => Self::load_from_path(p),
            None => Self::load_from_path(Self::default_config_path()?),
        }
    }

    pub fn default_config_path() -> Result<PathBuf, CoreError> {
        Ok(project_dirs()?.config_dir().join("config.yaml"))
    }

    pub fn data_dir(&self) -> Result<PathBuf, CoreError> {
        if let Some(custom) = &self.data_path {
            return Ok(PathBuf::from(custom));
        }
        Ok(project_dirs()?.data_dir().to_path_buf())
    }

    pub fn store_path(&self) -> Result<PathBuf, CoreError> {
        Ok(self.data_dir()?.join(&self.storage.file_name))
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config = Self::from_yaml(&text)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, CoreError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, CoreError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.schedule.validate()?;
        if self.sync.cleanup_batch_size == 0 || self.sync.cleanup_batch_size > 500 {
            return Err(CoreError::Config(format!(
                "cleanup_batch_size must be 1..=500, got {}",
                self.sync.cleanup_batch_size
            )));
        }
        if self.providers.retry.attempts == 0 {
            return Err(CoreError::Config("retry.attempts must be at least 1".into()));
        }
        Ok(())
    }

    /// Read the snapshot password from the configured environment variable.
    pub fn storage_password(&self) -> Result<String, CoreError> {
        std::env::var(&self.storage.password_env).map_err(|_| {
            CoreError::Config(format!(
                "Environment variable {} is not set",
                self.storage.password_env
            ))
        })
    }
}
