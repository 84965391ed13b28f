//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `QUADSYNC_WORK_DIR` and `QUADSYNC_LOG_LEVEL` env overrides.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::sync::SyncOptions;

/// Index backend configuration (`[index]`).
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Database file for the index; `None` keeps the index in memory.
    /// Relative paths resolve against `work_dir`.
    pub db_path: Option<PathBuf>,
}

/// Synchroniser tuning (`[sync]`).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Hit cap for the fallback search used on mapping misses.
    pub fallback_search_limit: usize,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub index: IndexConfig,
    pub sync: SyncConfig,
}

impl Config {
    /// The index database path resolved against `work_dir`, or `None` for
    /// an in-memory index.
    pub fn index_db_path(&self) -> Option<PathBuf> {
        self.index.db_path.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                self.work_dir.join(path)
            }
        })
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions { fallback_search_limit: self.sync.fallback_search_limit }
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    runtime: RawRuntime,
    #[serde(default)]
    index: RawIndex,
    #[serde(default)]
    sync: RawSync,
}

#[derive(Deserialize)]
struct RawRuntime {
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize, Default)]
struct RawIndex {
    #[serde(default)]
    db_path: Option<String>,
}

#[derive(Deserialize)]
struct RawSync {
    #[serde(default = "default_fallback_search_limit")]
    fallback_search_limit: usize,
}

impl Default for RawSync {
    fn default() -> Self {
        Self { fallback_search_limit: default_fallback_search_limit() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fallback_search_limit() -> usize {
    100
}

/// Load config from `config/default.toml`, then apply env-var overrides.
pub fn load() -> Result<Config, AppError> {
    let work_dir_override = env::var("QUADSYNC_WORK_DIR").ok();
    let log_level_override = env::var("QUADSYNC_LOG_LEVEL").ok();
    load_from(
        Path::new("config/default.toml"),
        work_dir_override.as_deref(),
        log_level_override.as_deref(),
    )
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let work_dir_str = work_dir_override.unwrap_or(&parsed.runtime.work_dir).to_string();
    let work_dir = expand_home(&work_dir_str);
    let log_level = log_level_override.unwrap_or(&parsed.runtime.log_level).to_string();

    Ok(Config {
        work_dir,
        log_level,
        index: IndexConfig {
            db_path: parsed.index.db_path.map(|p| expand_home(&p)),
        },
        sync: SyncConfig {
            fallback_search_limit: parsed.sync.fallback_search_limit,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests — in-memory index, temp-friendly defaults.
#[cfg(test)]
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            index: IndexConfig { db_path: None },
            sync: SyncConfig { fallback_search_limit: default_fallback_search_limit() },
        }
    }
}
