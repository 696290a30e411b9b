//! Application configuration.
//!
//! Values come from built-in defaults, then `~/.config/saga/config.toml`,
//! then `SAGA_*` environment variables (`SAGA_PAGING__PAGE_SIZE=50`).

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::paging::{
    loader::{DEFAULT_CACHE_CAPACITY, DEFAULT_PAGE_SIZE},
    EvictionPolicy, LoaderOptions,
};

/// Directory under the user's config dir holding `config.toml`.
pub const CONFIG_DIR: &str = "saga";
const CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "SAGA";

const DEFAULT_CONFIG: &str = r#"# saga configuration

# Directory holding the achievement, leaderboard, and statistics JSON files.
# data_dir = "/home/me/.local/share/saga"

# Artificial delay (milliseconds) added to every fetch, handy for watching
# prefetch at work.
demo_latency_ms = 0

[paging]
# Items per page. Non-positive values fall back to 20.
page_size = 20
# Pages kept in memory per list. Non-positive values fall back to 3.
cache_capacity = 3
# Pages to warm ahead of the cursor after each navigation.
prefetch_ahead = 1
# "fifo" evicts the oldest loaded page, "lru" the least recently viewed.
eviction = "fifo"
"#;

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the browsable collections.
    pub data_dir: PathBuf,
    /// Delay added to each fetch of the bundled file sources.
    pub demo_latency_ms: u64,
    /// Page loader sizing.
    pub paging: PagingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            demo_latency_ms: 0,
            paging: PagingConfig::default(),
        }
    }
}

/// Page loader settings as written by the user. Validated by
/// [`PagingConfig::loader_options`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Items per page.
    pub page_size: i64,
    /// Maximum resident pages per list.
    pub cache_capacity: i64,
    /// Pages prefetched past the cursor after navigation.
    pub prefetch_ahead: usize,
    /// Which page to drop once the cache is full.
    pub eviction: EvictionPolicy,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE as i64,
            cache_capacity: DEFAULT_CACHE_CAPACITY as i64,
            prefetch_ahead: 1,
            eviction: EvictionPolicy::Fifo,
        }
    }
}

impl PagingConfig {
    /// Loader options with invalid sizes replaced by defaults.
    pub fn loader_options(&self) -> LoaderOptions {
        let options = LoaderOptions::new(self.page_size, self.cache_capacity)
            .with_eviction(self.eviction);
        if options.page_size() as i64 != self.page_size {
            warn!(
                configured = self.page_size,
                using = options.page_size(),
                "invalid page_size"
            );
        }
        if options.cache_capacity() as i64 != self.cache_capacity {
            warn!(
                configured = self.cache_capacity,
                using = options.cache_capacity(),
                "invalid cache_capacity"
            );
        }
        options
    }
}

impl AppConfig {
    /// Load from the default config path and environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load from `path` (optional on disk) and environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_env(path.as_ref(), None)
    }

    /// Load from `path`, reading overrides from `env` instead of the process
    /// environment when given.
    fn load_with_env(path: &Path, env: Option<config::Map<String, String>>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?;
        settings
            .try_deserialize()
            .with_context(|| format!("failed to parse config {}", path.display()))
    }
}

/// Default location of `config.toml`.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

/// Write a commented default config unless one already exists.
pub fn ensure_default_config() -> Result<()> {
    write_default_config(config_path())
}

fn write_default_config(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote default config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_file_round_trips() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("saga").join(CONFIG_FILE);
        write_default_config(&path)?;
        assert!(path.is_file());

        let config = AppConfig::load_from(&path)?;
        assert_eq!(config.paging.page_size, 20);
        assert_eq!(config.paging.cache_capacity, 3);
        assert_eq!(config.paging.prefetch_ahead, 1);
        assert_eq!(config.paging.eviction, EvictionPolicy::Fifo);
        Ok(())
    }

    #[test]
    fn existing_file_is_left_alone() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "demo_latency_ms = 15\n")?;
        write_default_config(&path)?;
        assert_eq!(fs::read_to_string(&path)?, "demo_latency_ms = 15\n");
        Ok(())
    }

    #[test]
    fn missing_file_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        let config = AppConfig::load_from(dir.path().join("absent.toml"))?;
        assert_eq!(config.demo_latency_ms, 0);
        assert_eq!(config.paging.loader_options(), LoaderOptions::default());
        Ok(())
    }

    #[test]
    fn environment_overrides_the_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "demo_latency_ms = 5\n[paging]\npage_size = 20\n")?;

        let env = config::Map::from([
            ("SAGA_PAGING__PAGE_SIZE".to_string(), "50".to_string()),
            ("SAGA_DEMO_LATENCY_MS".to_string(), "120".to_string()),
        ]);
        let config = AppConfig::load_with_env(&path, Some(env))?;
        assert_eq!(config.paging.page_size, 50);
        assert_eq!(config.demo_latency_ms, 120);
        assert_eq!(config.paging.cache_capacity, 3);
        Ok(())
    }

    #[test]
    fn invalid_sizes_are_normalized() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "[paging]\npage_size = 0\ncache_capacity = -2\neviction = \"lru\"\n",
        )?;

        let config = AppConfig::load_from(&path)?;
        let options = config.paging.loader_options();
        assert_eq!(options.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(options.cache_capacity(), DEFAULT_CACHE_CAPACITY);
        assert_eq!(options.eviction(), EvictionPolicy::Lru);
        Ok(())
    }
}
