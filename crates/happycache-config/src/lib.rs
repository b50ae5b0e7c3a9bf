//! Configuration and structured logging for happycache.
//!
//! A global `Lazy<RwLock<Config>>`, a `serde`/`toml` schema loaded from an
//! optional project-local file, then overridden by environment variables.
//! There is deliberately no `~/.happycache/config.toml` tier — a
//! single-binary CLI tool has no analogue of a multi-project global
//! config (see DESIGN.md).

pub mod logging;

use std::path::PathBuf;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| {
    RwLock::new(Config::load().unwrap_or_else(|e| {
        eprintln!("[happycache-config] WARNING: failed to load config: {e}. Using defaults.");
        Config::default()
    }))
});

/// Project-local config file name, read from the current directory.
pub const CONFIG_FILE_NAME: &str = "happycache.toml";

/// Get the global config (read-only).
pub fn config() -> std::sync::RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap()
}

/// Reload the global config from disk and the environment.
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap() = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Pipeline tuning knobs, overlaid on top of `happycache-core`'s own
/// platform-derived defaults (worker count, page budget) so this crate
/// never needs to query the OS itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Worker pool size for both pipelines. `None` defers to
    /// `online_cpus * 8`, computed by `happycache-core`.
    pub worker_threads: Option<usize>,
    /// Pages per residency-probe `mmap` chunk.
    pub chunk_pages: u64,
    /// Pages per `posix_fadvise` hint call.
    pub prefetch_block_pages: u64,
    /// Ceiling on total pages dispatched during a load run. `None` defers
    /// to the system RAM page count.
    pub max_page_budget: Option<u64>,
    /// Default map file path for both `dump` and `load`.
    pub map_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_threads: None,
            chunk_pages: 1 << 20,
            prefetch_block_pages: 8,
            max_page_budget: None,
            map_path: PathBuf::from(".happycache.gz"),
        }
    }
}

impl Config {
    /// Load from `./happycache.toml` if present, then apply environment
    /// overrides. Missing file is not an error; malformed TOML is.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let path = PathBuf::from(CONFIG_FILE_NAME);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            config = toml::from_str(&contents)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("HAPPYCACHE_THREADS") {
            if let Ok(n) = v.parse() {
                self.worker_threads = Some(n);
            }
        }
        if let Ok(v) = std::env::var("HAPPYCACHE_CHUNK_PAGES") {
            if let Ok(n) = v.parse() {
                self.chunk_pages = n;
            }
        }
        if let Ok(v) = std::env::var("HAPPYCACHE_PREFETCH_BLOCK_PAGES") {
            if let Ok(n) = v.parse() {
                self.prefetch_block_pages = n;
            }
        }
        if let Ok(v) = std::env::var("HAPPYCACHE_MAX_PAGES") {
            if let Ok(n) = v.parse() {
                self.max_page_budget = Some(n);
            }
        }
        if let Ok(v) = std::env::var("HAPPYCACHE_MAP_PATH") {
            self.map_path = PathBuf::from(v);
        }
    }
}
