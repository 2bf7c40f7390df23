use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::DefuseError;

pub const DEFAULT_RATIO_THRESHOLD: f64 = 1032.0;
pub const DEFAULT_NESTED_ZIPS_LIMIT: u32 = 3;
pub const DEFAULT_NESTED_LEVELS_LIMIT: u32 = 3;
pub const DEFAULT_KILLSWITCH_SECONDS: u64 = 3;
pub const DEFAULT_MAX_CPU_TIME: u64 = 5;
pub const DEFAULT_MAX_MEMORY: u64 = 128 * 1024 * 1024;
pub const DEFAULT_MAX_FILESIZE: u64 = 128 * 1024 * 1024;

/// Thresholds a scan session is judged against.
///
/// Zero for either nested limit means "unlimited".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfiguration {
    /// Maximum uncompressed/compressed ratio before the archive is flagged
    pub ratio_threshold: f64,
    /// Nested archives allowed across the whole tree
    pub nested_zips_limit: u32,
    /// Recursion depth allowed when descending into nested archives
    pub nested_levels_limit: u32,
    /// Wall-clock budget for the whole traversal
    pub killswitch_seconds: u64,
    pub symlinks_allowed: bool,
    pub directory_traversal_allowed: bool,
}

impl Default for ScanConfiguration {
    fn default() -> Self {
        Self {
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            nested_zips_limit: DEFAULT_NESTED_ZIPS_LIMIT,
            nested_levels_limit: DEFAULT_NESTED_LEVELS_LIMIT,
            killswitch_seconds: DEFAULT_KILLSWITCH_SECONDS,
            symlinks_allowed: false,
            directory_traversal_allowed: false,
        }
    }
}

impl ScanConfiguration {
    /// Load a configuration file, picking the format from its extension.
    ///
    /// Missing keys fall back to the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading scan configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let config: Self = match ext.as_str() {
            "toml" => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?,
            other => {
                return Err(anyhow::anyhow!(
                    "Unsupported config format '{}' for {}", other, path.display()
                ));
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !self.ratio_threshold.is_finite() || self.ratio_threshold < 0.0 {
            return Err(DefuseError::Config(format!(
                "ratio_threshold must be a non-negative number, got {}",
                self.ratio_threshold
            )));
        }
        Ok(())
    }

    pub fn nested_zips_limit(&self) -> Option<u32> {
        (self.nested_zips_limit > 0).then_some(self.nested_zips_limit)
    }

    pub fn nested_levels_limit(&self) -> Option<u32> {
        (self.nested_levels_limit > 0).then_some(self.nested_levels_limit)
    }

    pub fn killswitch(&self) -> Duration {
        Duration::from_secs(self.killswitch_seconds)
    }
}

/// Process limits applied for the duration of a safe extraction.
///
/// `None` leaves the corresponding limit as it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU seconds the extraction may consume
    pub max_cpu_time: Option<u64>,
    /// Address space in bytes
    pub max_memory: Option<u64>,
    /// Largest single file the process may write, in bytes
    pub max_filesize: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_cpu_time: Some(DEFAULT_MAX_CPU_TIME),
            max_memory: Some(DEFAULT_MAX_MEMORY),
            max_filesize: Some(DEFAULT_MAX_FILESIZE),
        }
    }
}

impl ResourceLimits {
    pub fn unlimited() -> Self {
        Self {
            max_cpu_time: None,
            max_memory: None,
            max_filesize: None,
        }
    }
}
