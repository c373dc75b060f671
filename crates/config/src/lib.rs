//! Layered configuration for nusdec.
//!
//! Settings are merged, lowest priority first, from:
//!
//! 1. built-in defaults,
//! 2. a configuration file (TOML, YAML or JSON, picked by extension),
//! 3. `NUSDEC_*` environment variables (`__` separates sections, so
//!    `NUSDEC_KEYS__COMMON_KEY` sets `keys.common_key`),
//! 4. whatever the caller merges on top, normally command-line flags.
//!
//! No key material has a default. Keys are read from hex strings in the
//! configuration or, for the common key, from a raw 16-byte key file.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use nusdec_crypto::Key;
use nusdec_title::{KeyIndex, SharedKeys, TitleKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Base URL of the public content server.
pub const DEFAULT_BASE_URL: &str = "http://ccs.cdn.wup.shop.nintendo.net/ccs/download";
/// Key file looked up in the working directory when no common key is set.
pub const DEFAULT_COMMON_KEY_FILE: &str = "common.key";
const ENV_PREFIX: &str = "NUSDEC_";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub keys: KeyConfig,
    pub source: SourceConfig,
    pub extract: ExtractConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Common key as 32 hex characters. Takes precedence over the key file.
    pub common_key: Option<String>,
    /// Raw 16-byte common key file; ignored if it does not exist.
    pub common_key_file: PathBuf,
    pub korean_key: Option<String>,
    pub vwii_key: Option<String>,
    /// Title key as 32 hex characters. When set, tickets are not used.
    pub title_key: Option<String>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            common_key: None,
            common_key_file: PathBuf::from(DEFAULT_COMMON_KEY_FILE),
            korean_key: None,
            vwii_key: None,
            title_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Read the title from this directory instead of the content server.
    pub directory: Option<PathBuf>,
    pub base_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { directory: None, base_url: DEFAULT_BASE_URL.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Parent of the per-title output directories.
    pub output: PathBuf,
    /// Files extracted at once; `0` means one per available CPU.
    pub concurrency: usize,
    pub overwrite: bool,
    /// Regex a file's path must fully match to be extracted.
    pub pattern: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { output: PathBuf::from("."), concurrency: 0, overwrite: false, pattern: ".*".to_string() }
    }
}

impl Config {
    /// Defaults, the configuration file and the environment, unextracted so
    /// callers can merge their own overrides on top.
    ///
    /// With no explicit `file`, `config.toml` in the platform configuration
    /// directory is used if it exists.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file.map(Path::to_path_buf).or_else(default_config_file) {
            tracing::debug!(path = %path.display(), "using configuration file");
            figment = merge_file(figment, &path);
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract a configuration. Values are not checked until
    /// [`validate()`](Self::validate), so callers can replace bad ones
    /// first.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        Ok(figment.extract().map_err(|e| ErrorKind::Load(e.to_string()))?)
    }

    /// Load defaults, file and environment, unvalidated.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(file))
    }

    /// Check every key parses, without reading the key file.
    pub fn validate(&self) -> Result<()> {
        self.keys.hex_key("keys.common_key", self.keys.common_key.as_deref())?;
        self.keys.hex_key("keys.korean_key", self.keys.korean_key.as_deref())?;
        self.keys.hex_key("keys.vwii_key", self.keys.vwii_key.as_deref())?;
        self.keys.hex_key("keys.title_key", self.keys.title_key.as_deref())?;
        if self.extract.pattern.is_empty() {
            exn::bail!(ErrorKind::InvalidValue { field: "extract.pattern", reason: "must not be empty".to_string() });
        }
        Ok(())
    }

    /// Concurrency with `0` resolved to the available parallelism.
    pub fn concurrency(&self) -> usize {
        match self.extract.concurrency {
            0 => std::thread::available_parallelism().map(usize::from).unwrap_or(4),
            n => n,
        }
    }
}

impl KeyConfig {
    fn hex_key(&self, field: &'static str, value: Option<&str>) -> Result<Option<Key>> {
        value.map(|hex| hex.parse::<Key>().or_raise(|| ErrorKind::InvalidKey { field })).transpose()
    }

    /// The common key from `common_key`, or else from `common_key_file` if
    /// that file exists.
    pub fn common_key(&self) -> Result<Option<Key>> {
        if let Some(key) = self.hex_key("keys.common_key", self.common_key.as_deref())? {
            return Ok(Some(key));
        }
        let path = &self.common_key_file;
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no common key file");
            return Ok(None);
        }
        let bytes = std::fs::read(path).or_raise(|| ErrorKind::KeyFile(path.clone()))?;
        let key = Key::try_from(bytes.as_slice()).or_raise(|| ErrorKind::InvalidKey { field: "keys.common_key_file" })?;
        tracing::debug!(path = %path.display(), "loaded common key from file");
        Ok(Some(key))
    }

    /// Every configured shared key.
    pub fn shared_keys(&self) -> Result<SharedKeys> {
        let mut keys = SharedKeys::new();
        if let Some(key) = self.common_key()? {
            keys = keys.with_key(KeyIndex::Common, key);
        }
        if let Some(key) = self.hex_key("keys.korean_key", self.korean_key.as_deref())? {
            keys = keys.with_key(KeyIndex::Korean, key);
        }
        if let Some(key) = self.hex_key("keys.vwii_key", self.vwii_key.as_deref())? {
            keys = keys.with_key(KeyIndex::Vwii, key);
        }
        Ok(keys)
    }

    pub fn title_key(&self) -> Result<Option<TitleKey>> {
        Ok(self.hex_key("keys.title_key", self.title_key.as_deref())?.map(TitleKey::new))
    }
}

fn default_config_file() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "nusdec")?;
    let path = dirs.config_dir().join(CONFIG_FILE_NAME);
    path.is_file().then_some(path)
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => figment.merge(Toml::file_exact(path)),
    }
}
