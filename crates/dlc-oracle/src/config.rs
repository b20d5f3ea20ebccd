//! Configuration file loading.
//!
//! ```toml
//! [oracle]
//! key_file = "oracle.key"
//!
//! [database]
//! path = "oracle.db"
//!
//! [feed]
//! prices_file = "prices.json"
//! max_age = "PT5M"
//!
//! [log]
//! level = "info"
//!
//! [assets.btcusd]
//! start_date = "2020-01-01T00:00:00Z"
//! frequency = "PT1H"
//! range = "P2D"
//! base = 2
//! nb_digits = 20
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use dlc_oracle_core::{parse_duration, split_asset_id, AssetConfig, CryptoError, OracleKeypair};

/// Database path that selects an in-memory SQLite database.
pub const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("asset {asset_id}: {reason}")]
    InvalidAsset { asset_id: String, reason: String },

    #[error("no oracle key configured (set oracle.key_file or oracle.key_hex)")]
    MissingKey,

    #[error("invalid oracle key: {0}")]
    Key(#[from] CryptoError),
}

/// Complete oracle configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub oracle: KeyConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub assets: BTreeMap<String, AssetEntry>,
}

/// Where the oracle's long-term key comes from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyConfig {
    /// File holding a hex secret, or an unencrypted SEC1 or PKCS#8 PEM key.
    /// Relative to the config file.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Hex secret inline. Ignored when `key_file` is set.
    #[serde(default)]
    pub key_hex: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file, or `"memory"`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedConfig {
    /// JSON price history. Relative to the config file.
    #[serde(default)]
    pub prices_file: Option<PathBuf>,
    /// Oldest observation accepted for a publish date. Defaults to each
    /// asset's frequency.
    #[serde(default, deserialize_with = "iso_duration_opt")]
    pub max_age: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// One `[assets.<id>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetEntry {
    pub start_date: DateTime<Utc>,
    #[serde(deserialize_with = "iso_duration")]
    pub frequency: Duration,
    #[serde(deserialize_with = "iso_duration")]
    pub range: Duration,
    #[serde(default = "default_base")]
    pub base: u16,
    #[serde(default = "default_nb_digits")]
    pub nb_digits: u16,
    #[serde(default)]
    pub is_signed: bool,
    #[serde(default)]
    pub precision: i32,
    /// Defaults to the quote currency in the asset id.
    #[serde(default)]
    pub unit: Option<String>,
}

fn default_database_path() -> String {
    "oracle.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base() -> u16 {
    2
}

fn default_nb_digits() -> u16 {
    20
}

fn iso_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn iso_duration_opt<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    iso_duration(deserializer).map(Some)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl OracleConfig {
    /// Load and validate a configuration file.
    ///
    /// Relative paths inside the file are resolved against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(dir) = path.parent() {
            config.resolve_relative_to(dir);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: OracleConfig = toml::from_str(content)?;
        config.asset_configs()?;
        Ok(config)
    }

    fn resolve_relative_to(&mut self, dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        if let Some(p) = self.oracle.key_file.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.feed.prices_file.as_mut() {
            resolve(p);
        }
        if self.database.path != MEMORY_DATABASE && Path::new(&self.database.path).is_relative() {
            self.database.path = dir.join(&self.database.path).to_string_lossy().into_owned();
        }
    }

    /// Validated per-asset settings.
    pub fn asset_configs(&self) -> Result<BTreeMap<String, AssetConfig>, ConfigError> {
        self.assets
            .iter()
            .map(|(asset_id, entry)| {
                let config = entry.to_asset_config(asset_id);
                config.validate().map_err(|e| ConfigError::InvalidAsset {
                    asset_id: asset_id.clone(),
                    reason: e.to_string(),
                })?;
                Ok((asset_id.clone(), config))
            })
            .collect()
    }

    /// Read the oracle key from `key_file` or `key_hex`.
    pub fn load_keypair(&self) -> Result<OracleKeypair, ConfigError> {
        if let Some(path) = &self.oracle.key_file {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            return Ok(parse_key(&content)?);
        }
        match &self.oracle.key_hex {
            Some(hex) => Ok(OracleKeypair::from_hex(hex.trim())?),
            None => Err(ConfigError::MissingKey),
        }
    }

    /// How old a price may be when attesting `asset`.
    pub fn price_max_age(&self, asset: &AssetConfig) -> Duration {
        self.feed.max_age.unwrap_or(asset.frequency)
    }

    pub fn uses_memory_database(&self) -> bool {
        self.database.path == MEMORY_DATABASE
    }
}

impl AssetEntry {
    fn to_asset_config(&self, asset_id: &str) -> AssetConfig {
        let unit = self
            .unit
            .clone()
            .unwrap_or_else(|| split_asset_id(asset_id).1.to_string());
        AssetConfig {
            start_date: self.start_date,
            frequency: self.frequency,
            range: self.range,
            base: self.base,
            nb_digits: self.nb_digits,
            is_signed: self.is_signed,
            precision: self.precision,
            unit,
        }
    }
}

fn parse_key(content: &str) -> Result<OracleKeypair, CryptoError> {
    let content = content.trim();
    if content.starts_with("-----BEGIN") {
        OracleKeypair::from_pem(content)
    } else {
        OracleKeypair::from_hex(content)
    }
}
