//! Credentials file handling.
//!
//! The credentials file is a TOML document listing API keys and the domain
//! patterns each key may act on:
//!
//! ```toml
//! [api_keys.certbot]
//! key = "s3cret"
//! domains = ["*.internal.example.com", "internal.example.com"]
//! ```
//!
//! It is re-read on every authenticated request, so edits apply without a
//! restart.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use globset::{GlobBuilder, GlobMatcher};
use serde::Deserialize;

/// Environment variable naming the credentials file.
pub const CONFIG_FILE_ENV: &str = "LOCAL_ACME_DNS_CONFIG_FILE";

/// Location used when neither the CLI nor the environment names a file.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/acme/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse credentials file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("API key {name} has no secret")]
    MissingSecret { name: String },
    #[error("API key {name} has an invalid domain pattern {pattern:?}: {source}")]
    Pattern {
        name: String,
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Resolve the credentials file location.
pub fn config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Parsed credentials file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub api_keys: BTreeMap<String, ApiKeyConfig>,
}

/// One API key and the domains it may present challenges for.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    /// Entries without a secret never authenticate.
    #[serde(default)]
    pub key: Option<String>,
    /// Shell-style patterns (`*`, `?`, `[...]`) matched against the
    /// requested fqdn.
    #[serde(default)]
    pub domains: Vec<String>,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Async variant of [`Credentials::load`] for request handlers.
    pub async fn load_async(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Look up a key by name and check its secret.
    pub fn authenticate(&self, name: &str, secret: &str) -> Option<&ApiKeyConfig> {
        self.api_keys.get(name).filter(|config| match &config.key {
            Some(key) => constant_time_eq(key.as_bytes(), secret.as_bytes()),
            None => {
                tracing::warn!("API key {} has no secret configured", name);
                false
            }
        })
    }

    /// Every entry that can never be used as written: keys without a
    /// secret and domain patterns that do not compile.
    pub fn problems(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();
        for (name, config) in &self.api_keys {
            if config.key.is_none() {
                problems.push(ConfigError::MissingSecret { name: name.clone() });
            }
            for pattern in &config.domains {
                if let Err(source) = compile_pattern(pattern) {
                    problems.push(ConfigError::Pattern {
                        name: name.clone(),
                        pattern: pattern.clone(),
                        source,
                    });
                }
            }
        }
        problems
    }
}

impl ApiKeyConfig {
    /// Whether any of this key's domain patterns matches `fqdn`.
    ///
    /// Matching ignores case and a trailing dot on either side.
    pub fn allows(&self, fqdn: &str) -> bool {
        let candidate = fqdn.trim().trim_end_matches('.');
        self.domains
            .iter()
            .any(|pattern| match compile_pattern(pattern) {
                Ok(matcher) => matcher.is_match(candidate),
                Err(e) => {
                    tracing::warn!("Ignoring invalid domain pattern {:?}: {}", pattern, e);
                    false
                }
            })
    }
}

fn compile_pattern(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    let pattern = pattern.trim().trim_end_matches('.');
    Ok(GlobBuilder::new(pattern)
        .case_insensitive(true)
        .literal_separator(false)
        .build()?
        .compile_matcher())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
