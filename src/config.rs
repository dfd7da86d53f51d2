//! Settings for the wgclient tool

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{WgClientError, WgClientResult};

/// Tool settings, usually read from `wgclient.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Configuration file paths
    #[serde(default)]
    pub paths: SettingsPaths,
    /// Name resolution settings
    #[serde(default)]
    pub resolver: ResolverSettings,
    /// Output settings
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPaths {
    /// Registry JSON document
    #[serde(default = "default_registry")]
    pub registry: PathBuf,
    /// Directory generated configs are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// DNS server (`ip`, `ip:port` or `host:port`) used for DNSNames; the system resolver when unset
    #[serde(default)]
    pub nameserver: Option<String>,
    /// Per-lookup timeout for the nameserver (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Deadline for the whole allow-list build (seconds, 0 = none)
    #[serde(default)]
    pub build_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Permission bits of generated files
    #[serde(default = "default_file_mode")]
    pub file_mode: u32,
}

fn default_registry() -> PathBuf {
    PathBuf::from("config.json")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("clients")
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_file_mode() -> u32 {
    0o600
}

impl Default for SettingsPaths {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            nameserver: None,
            timeout_secs: default_timeout_secs(),
            build_timeout_secs: 0,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            file_mode: default_file_mode(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            paths: SettingsPaths::default(),
            resolver: ResolverSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl ResolverSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Overall build deadline, if one is configured
    pub fn build_timeout(&self) -> Option<Duration> {
        if self.build_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.build_timeout_secs))
        }
    }
}

impl Settings {
    /// Load settings from file
    pub fn load<P: AsRef<Path>>(path: P) -> WgClientResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| WgClientError::ConfigParse(format!("Failed to read settings: {}", e)))?;

        let settings: Settings = toml::from_str(&content)
            .map_err(|e| WgClientError::ConfigParse(format!("Failed to parse settings: {}", e)))?;

        if settings.output.file_mode > 0o777 {
            return Err(WgClientError::ConfigParse(format!(
                "Invalid file_mode {:o}: must be at most 0o777",
                settings.output.file_mode
            )));
        }
        Ok(settings)
    }

    /// Save settings to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> WgClientResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| WgClientError::ConfigParse(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}
