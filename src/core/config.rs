//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{IshError, Result};
use crate::core::paths::resolve_relative_to;

/// Upper bound on the settle interval.
pub const MAX_SETTLE_INTERVAL_MS: u64 = 10 * 60 * 1000;

/// Full harness configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub harness: HarnessConfig,
    pub sut: SutConfig,
    pub paths: PathsConfig,
}

/// Scenario discovery and execution knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root holding the `search`, `searchRules` and `duplicates` trees.
    pub data_root: PathBuf,
    /// Blocking pause between input creation and the operation.
    pub settle_interval_ms: u64,
    /// File names to run; empty runs everything.
    pub inputs: Vec<String>,
    pub app_code: String,
    pub author_name: String,
    pub author_type: String,
}

/// Which system under test to drive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Http,
}

impl Backend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Http => "http",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "http" => Ok(Self::Http),
            other => Err(IshError::ConfigParse {
                context: "backend",
                details: format!("unknown backend {other:?} (expected memory or http)"),
            }),
        }
    }
}

/// Connection settings for the identity service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SutConfig {
    pub backend: Backend,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub create_path: String,
    pub search_path: String,
    pub duplicate_rules_path: String,
    pub duplicates_path: String,
    pub purge_path: String,
    pub index_path: String,
    pub search_rules_path: String,
}

/// Filesystem paths used by ish.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
    pub sqlite_db: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            settle_interval_ms: 1_000,
            inputs: Vec::new(),
            app_code: "TEST".to_string(),
            author_name: "identity scenario harness".to_string(),
            author_type: "application".to_string(),
        }
    }
}

impl Default for SutConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            base_url: None,
            timeout_secs: 30,
            create_path: "/identitystore/api/v3/identity/create".to_string(),
            search_path: "/identitystore/api/v3/identity/search".to_string(),
            duplicate_rules_path: "/identitystore/api/v3/duplicaterules".to_string(),
            duplicates_path: "/identitystore/api/v3/duplicates/search".to_string(),
            purge_path: "/identitystore/api/admin/identities".to_string(),
            index_path: "/identitystore/api/admin/index".to_string(),
            search_rules_path: "/identitystore/api/admin/searchrules".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[ISH-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let data = home_dir.join(".local").join("share").join("ish");
        Self {
            config_file: home_dir.join(".config").join("ish").join("config.toml"),
            jsonl_log: data.join("activity.jsonl"),
            sqlite_db: data.join("activity.sqlite3"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// A missing file at the default path is not an error; defaults are used.
    /// A relative `data_root` read from a file is resolved against the file's
    /// directory.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| IshError::io(&path_buf, source))?;
            let mut parsed: Self = toml::from_str(&raw)?;
            if let Some(dir) = path_buf.parent() {
                parsed.harness.data_root = resolve_relative_to(dir, &parsed.harness.data_root);
            }
            parsed
        } else if path.is_some() {
            return Err(IshError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // harness
        if let Some(raw) = lookup("ISH_DATA_ROOT") {
            self.harness.data_root = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("ISH_SETTLE_INTERVAL_MS") {
            self.harness.settle_interval_ms = parse_env_u64("ISH_SETTLE_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("ISH_INPUTS") {
            self.harness.inputs = split_allow_list(&raw);
        }
        if let Some(raw) = lookup("ISH_APP_CODE") {
            self.harness.app_code = raw;
        }
        if let Some(raw) = lookup("ISH_AUTHOR_NAME") {
            self.harness.author_name = raw;
        }

        // sut
        if let Some(raw) = lookup("ISH_SUT_BACKEND") {
            self.sut.backend = Backend::parse(&raw)?;
        }
        if let Some(raw) = lookup("ISH_SUT_BASE_URL") {
            self.sut.base_url = Some(raw);
        }
        if let Some(raw) = lookup("ISH_SUT_TIMEOUT_SECS") {
            self.sut.timeout_secs = parse_env_u64("ISH_SUT_TIMEOUT_SECS", &raw)?;
        }

        // paths
        if let Some(raw) = lookup("ISH_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("ISH_SQLITE_DB") {
            self.paths.sqlite_db = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.harness.app_code.trim().is_empty() {
            return Err(IshError::InvalidConfig {
                details: "harness.app_code must not be empty".to_string(),
            });
        }
        if self.harness.settle_interval_ms > MAX_SETTLE_INTERVAL_MS {
            return Err(IshError::InvalidConfig {
                details: format!(
                    "harness.settle_interval_ms must be <= {MAX_SETTLE_INTERVAL_MS}, got {}",
                    self.harness.settle_interval_ms
                ),
            });
        }
        if self.sut.timeout_secs == 0 {
            return Err(IshError::InvalidConfig {
                details: "sut.timeout_secs must be > 0".to_string(),
            });
        }
        if self.sut.backend == Backend::Http
            && self
                .sut
                .base_url
                .as_deref()
                .is_none_or(|url| url.trim().is_empty())
        {
            return Err(IshError::InvalidConfig {
                details: "sut.base_url is required when sut.backend = \"http\"".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a comma-separated allow-list, dropping blanks.
#[must_use]
pub fn split_allow_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim().parse::<u64>().map_err(|error| IshError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
