//! Feed configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::FeedError;
use crate::sink::{ExtensionFilter, normalize_extension};

/// Default number of files fetched per refill.
pub const DEFAULT_LIMIT: u64 = 500;

/// Configuration for feeding operations.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct FeedConfig {
    /// Files fetched per refill when a command gives no budget.
    #[builder(default = "DEFAULT_LIMIT")]
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Descend into subdirectories.
    #[builder(default = "true")]
    #[serde(default = "default_true", deserialize_with = "deserialize_flag")]
    pub recurse: bool,

    /// File extensions never emitted (case-insensitive).
    #[builder(default)]
    #[serde(default, deserialize_with = "deserialize_list")]
    pub exclude: Vec<String>,
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_true() -> bool {
    true
}

impl FeedConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref exclude) = self.exclude {
            check_extensions(exclude)?;
        }
        Ok(())
    }
}

fn check_extensions(exclude: &[String]) -> Result<(), String> {
    match exclude.iter().find(|ext| normalize_extension(ext).is_empty()) {
        Some(ext) => Err(format!("Excluded extension {ext:?} is empty")),
        None => Ok(()),
    }
}

impl FeedConfig {
    /// Create a new config builder.
    pub fn builder() -> FeedConfigBuilder {
        FeedConfigBuilder::default()
    }

    /// Location of the configuration file for a client name.
    pub fn default_path(client_name: &str) -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dripfeed").join(format!("{client_name}.conf")))
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, FeedError> {
        let text = std::fs::read_to_string(path).map_err(|e| FeedError::io(path, e))?;
        let config = Self::from_toml_str(&text).map_err(|source| FeedError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), ?config, "Loaded configuration");
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, FeedError> {
        match Self::load(path) {
            Err(FeedError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Check the configuration for invalid values.
    pub fn validate(&self) -> Result<(), FeedError> {
        check_extensions(&self.exclude).map_err(|message| FeedError::InvalidConfig { message })
    }

    /// Apply one `key=value` option. Returns `false` for unknown keys.
    ///
    /// Numbers parse like `strtoul`: leading digits are used and anything
    /// else reads as 0.
    pub fn apply_option(&mut self, key: &str, value: &str) -> bool {
        match key.trim() {
            "limit" => self.limit = parse_leading_u64(value),
            "recurse" => self.recurse = parse_leading_u64(value) != 0,
            "exclude" => self.exclude = split_list(value),
            other => {
                debug!(key = other, "Ignoring unknown option");
                return false;
            }
        }
        true
    }

    /// Apply script options of the form `<client_name>-<key>=<value>`.
    ///
    /// Options for other clients are ignored. Returns how many were applied.
    pub fn apply_script_opts<I, K, V>(&mut self, client_name: &str, opts: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let prefix = format!("{client_name}-");
        opts.into_iter()
            .filter(|(key, value)| {
                key.as_ref()
                    .strip_prefix(&prefix)
                    .is_some_and(|key| self.apply_option(key, value.as_ref()))
            })
            .count()
    }

    /// Build the extension filter for this configuration.
    pub fn exclusion_filter(&self) -> ExtensionFilter {
        ExtensionFilter::new(&self.exclude)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            recurse: true,
            exclude: Vec::new(),
        }
    }
}

/// Parse the leading decimal digits of `value`, 0 if there are none.
pub fn parse_leading_u64(value: &str) -> u64 {
    let value = value.trim_start();
    let value = value.strip_prefix('+').unwrap_or(value);
    value
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(u64::from(digit - b'0'))
        })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(flag) => flag,
        Flag::Int(n) => n != 0,
        Flag::Text(text) => parse_leading_u64(&text) != 0,
    })
}

fn deserialize_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum List {
        Many(Vec<String>),
        One(String),
    }

    Ok(match List::deserialize(deserializer)? {
        List::Many(items) => items,
        List::One(text) => split_list(&text),
    })
}
