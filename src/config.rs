//! Settings file and config path resolution.
//!
//! Settings are JSON with every field optional (`#[serde(default)]`), so a
//! partial file only overrides what it names. CLI flags are applied on top by
//! the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::core::clock::RunContext;
use crate::core::player::MissPolicy;
use crate::core::sizing::{AvailableMemoryPolicy, ByteBudgetPolicy, SizingPolicy};
use crate::entities::{ImageOptions, DEFAULT_RECOVERY_INTERVAL, MIN_FRAME_DELAY};

/// Settings file name, looked up in the config directory
pub const SETTINGS_FILE: &str = "gifreel.json";

/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "GIFREEL_CONFIG_DIR";

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub playback: PlaybackSettings,
    pub memory: MemorySettings,
}

/// Default cache-size heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SizingSettings {
    ByteBudget(ByteBudgetPolicy),
    AvailableMemory(AvailableMemoryPolicy),
}

impl Default for SizingSettings {
    fn default() -> Self {
        SizingSettings::ByteBudget(ByteBudgetPolicy::default())
    }
}

impl SizingSettings {
    pub fn policy(&self) -> Arc<dyn SizingPolicy> {
        match self {
            SizingSettings::ByteBudget(p) => Arc::new(p.clone()),
            SizingSettings::AvailableMemory(p) => Arc::new(p.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub optimal_frame_cache_size: Option<usize>, // None = ask the sizing policy
    pub predraw: bool,
    pub min_frame_delay_ms: u64,
    pub recovery_interval: usize,
    pub sizing: SizingSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            optimal_frame_cache_size: None,
            predraw: true,
            min_frame_delay_ms: MIN_FRAME_DELAY.as_millis() as u64,
            recovery_interval: DEFAULT_RECOVERY_INTERVAL,
            sizing: SizingSettings::default(),
        }
    }
}

impl CacheSettings {
    pub fn image_options(&self) -> ImageOptions {
        ImageOptions {
            optimal_frame_cache_size: self.optimal_frame_cache_size,
            predraw: self.predraw,
            min_frame_delay: Duration::from_millis(self.min_frame_delay_ms),
            recovery_interval: self.recovery_interval,
            sizing: self.sizing.policy(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub tick_hz: f64, // Display clock rate
    pub run_context: RunContext,
    pub miss_policy: MissPolicy,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            tick_hz: 60.0,
            run_context: RunContext::default(),
            miss_policy: MissPolicy::default(),
        }
    }
}

impl PlaybackSettings {
    /// Clock interval; rates outside 1-1000 Hz are clamped
    pub fn tick_interval(&self) -> Duration {
        let hz = if self.tick_hz.is_finite() { self.tick_hz.clamp(1.0, 1000.0) } else { 60.0 };
        Duration::from_secs_f64(1.0 / hz)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub low_memory_mb: u64, // 0 disables polling
    pub poll_interval_ms: u64,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            low_memory_mb: 256,
            poll_interval_ms: 1000,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse settings: {}", path.display()))
    }

    /// Defaults when the file does not exist; errors if it exists but is broken
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let settings = Self::load(path)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}

/// Configuration for overriding default application paths
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var (GIFREEL_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file.
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. GIFREEL_CONFIG_DIR environment variable
/// 3. Current directory IF it has a gifreel.json
/// 4. Platform config directory from dirs-next (e.g. ~/.config/gifreel)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config_dir(config).join(name)
}

fn config_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if current_dir.join(SETTINGS_FILE).exists() {
            return current_dir;
        }
    }

    if let Some(dir) = dirs_next::config_dir() {
        return dir.join("gifreel");
    }

    PathBuf::from(".")
}
