use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::entry_io::{DEFAULT_FETCH_CONCURRENCY, FetchOptions};
use crate::error::LogError;
use crate::log::DEFAULT_JOIN_CONCURRENCY;
use crate::sorting::{self, SortFn};

/// Tunables for logs opened by an application, read from `weft.toml`.
///
/// ```toml
/// [log]
/// pointer_count = 16
/// sort = "last-write-wins"
///
/// [fetch]
/// concurrency = 32
/// timeout_ms = 5000
///
/// [join]
/// concurrency = 16
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeftConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub join: JoinConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// How far back each append's skip links reach.
    #[serde(default = "default_pointer_count")]
    pub pointer_count: usize,
    #[serde(default = "default_sort")]
    pub sort: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            pointer_count: default_pointer_count(),
            sort: default_sort(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_fetch_concurrency(),
            timeout_ms: None,
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinConfig {
    #[serde(default = "default_join_concurrency")]
    pub concurrency: usize,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            concurrency: default_join_concurrency(),
        }
    }
}

impl WeftConfig {
    /// Reject values a log cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Configuration`] for a zero concurrency or an
    /// unknown sort name.
    pub fn validate(&self) -> Result<(), LogError> {
        if self.fetch.concurrency == 0 {
            return Err(LogError::Configuration(
                "fetch.concurrency must be at least 1".into(),
            ));
        }
        if self.join.concurrency == 0 {
            return Err(LogError::Configuration(
                "join.concurrency must be at least 1".into(),
            ));
        }
        if sorting::by_name(&self.log.sort).is_none() {
            return Err(LogError::Configuration(format!(
                "unknown sort '{}', expected '{}' or '{}'",
                self.log.sort,
                sorting::LAST_WRITE_WINS,
                sorting::ENTRY_HASH
            )));
        }
        Ok(())
    }

    /// The configured comparator, falling back to last-write-wins.
    #[must_use]
    pub fn sort_fn(&self) -> SortFn {
        sorting::by_name(&self.log.sort).unwrap_or(sorting::last_write_wins)
    }

    /// Fetch options carrying the configured concurrency, timeout and delay.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            concurrency: self.fetch.concurrency,
            timeout: self.fetch.timeout_ms.map(Duration::from_millis),
            delay: (self.fetch.delay_ms > 0).then(|| Duration::from_millis(self.fetch.delay_ms)),
            ..FetchOptions::default()
        }
    }
}

/// Load a config file. A missing file yields the defaults.
///
/// # Errors
///
/// Fails if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<WeftConfig> {
    if !path.exists() {
        return Ok(WeftConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<WeftConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_pointer_count() -> usize {
    1
}

fn default_sort() -> String {
    sorting::LAST_WRITE_WINS.to_string()
}

const fn default_fetch_concurrency() -> usize {
    DEFAULT_FETCH_CONCURRENCY
}

const fn default_join_concurrency() -> usize {
    DEFAULT_JOIN_CONCURRENCY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = load_config(&dir.path().join("weft.toml")).expect("load should succeed");
        assert_eq!(cfg.log.pointer_count, 1);
        assert_eq!(cfg.log.sort, "last-write-wins");
        assert_eq!(cfg.fetch.concurrency, 32);
        assert_eq!(cfg.fetch.timeout_ms, None);
        assert_eq!(cfg.join.concurrency, 16);
        cfg.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("weft.toml");
        std::fs::write(
            &path,
            r#"
[log]
pointer_count = 64

[fetch]
timeout_ms = 250
delay_ms = 5
"#,
        )
        .expect("write config");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.log.pointer_count, 64);
        assert_eq!(cfg.log.sort, "last-write-wins");
        assert_eq!(cfg.join.concurrency, 16);

        let fetch = cfg.fetch_options();
        assert_eq!(fetch.timeout, Some(Duration::from_millis(250)));
        assert_eq!(fetch.delay, Some(Duration::from_millis(5)));
        assert_eq!(fetch.concurrency, 32);
        assert_eq!(fetch.length, None);
    }

    #[test]
    fn parse_error_names_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("weft.toml");
        std::fs::write(&path, "[log\npointer_count = ").expect("write config");

        let err = load_config(&path).expect_err("parse should fail");
        assert!(format!("{err:#}").contains("weft.toml"));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut cfg = WeftConfig::default();
        cfg.join.concurrency = 0;
        let err = cfg.validate().expect_err("invalid");
        assert!(matches!(err, LogError::Configuration(_)));

        let mut cfg = WeftConfig::default();
        cfg.fetch.concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_sort_rejected() {
        let mut cfg = WeftConfig::default();
        cfg.log.sort = "random".into();
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("random"));
    }

    #[test]
    fn entry_hash_sort_accepted() {
        let cfg: WeftConfig = toml::from_str("[log]\nsort = \"entry-hash\"\n").expect("parse");
        cfg.validate().expect("valid");
        assert_eq!(cfg.log.sort, sorting::ENTRY_HASH);
    }
}
