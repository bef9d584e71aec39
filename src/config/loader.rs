//! Configuration loading from synthbox.json

use crate::config::types::{EvaluatorConfig, Result, SynthError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// On-disk overrides. Every field is optional; absent fields keep the
/// built-in default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfigFile {
    pub language: Option<String>,
    pub runtime_path: Option<PathBuf>,
    pub entry_point: Option<String>,
    pub input_marker: Option<String>,
    pub allowed_modules: Option<Vec<String>>,
    pub timeout_seconds: Option<f64>,
    pub strict_mode: Option<bool>,
    pub enable_network_namespace: Option<bool>,
    pub enable_pid_namespace: Option<bool>,
    pub enable_syscall_filter: Option<bool>,
    pub limits: Option<LimitsFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsFile {
    pub memory_limit_mb: Option<u64>,
    pub cpu_time_limit_secs: Option<u64>,
    pub file_size_limit_kb: Option<u64>,
    pub fd_limit: Option<u64>,
    pub process_limit: Option<u64>,
    pub output_limit_kb: Option<usize>,
}

fn out_of_range(field: &str, value: impl std::fmt::Display) -> SynthError {
    SynthError::Config(format!("{} {} is out of range", field, value))
}

impl HarnessConfigFile {
    /// Load overrides from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SynthError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| SynthError::Config(format!("Failed to parse config JSON: {}", e)))
    }

    /// Load ./synthbox.json when present, otherwise no overrides.
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| SynthError::Config(format!("Failed to get current directory: {}", e)))?
            .join("synthbox.json");

        if !config_path.exists() {
            return Ok(Self::default());
        }

        log::info!("Loading configuration from {}", config_path.display());
        Self::load_from_file(config_path)
    }

    /// Layer these overrides onto `config`.
    pub fn apply_to(&self, config: &mut EvaluatorConfig) -> Result<()> {
        if let Some(language) = &self.language {
            config.language = language.to_lowercase();
        }
        if let Some(runtime_path) = &self.runtime_path {
            config.runtime_path = runtime_path.clone();
        }
        if let Some(entry_point) = &self.entry_point {
            config.entry_point = entry_point.clone();
        }
        if let Some(input_marker) = &self.input_marker {
            config.input_marker = input_marker.clone();
        }
        if let Some(allowed_modules) = &self.allowed_modules {
            config.allowed_modules = allowed_modules.clone();
        }
        if let Some(secs) = self.timeout_seconds {
            config.timeout = Duration::try_from_secs_f64(secs)
                .map_err(|e| SynthError::Config(format!("invalid timeout_seconds {}: {}", secs, e)))?;
        }
        if let Some(strict_mode) = self.strict_mode {
            config.strict_mode = strict_mode;
        }
        if let Some(enable) = self.enable_network_namespace {
            config.enable_network_namespace = enable;
        }
        if let Some(enable) = self.enable_pid_namespace {
            config.enable_pid_namespace = enable;
        }
        if let Some(enable) = self.enable_syscall_filter {
            config.enable_syscall_filter = enable;
        }
        if let Some(limits) = &self.limits {
            if let Some(mb) = limits.memory_limit_mb {
                let bytes = mb
                    .checked_mul(1024 * 1024)
                    .ok_or_else(|| out_of_range("memory_limit_mb", mb))?;
                config.limits.memory_limit = Some(bytes);
            }
            if let Some(secs) = limits.cpu_time_limit_secs {
                config.limits.cpu_time_limit_secs = Some(secs);
            }
            if let Some(kb) = limits.file_size_limit_kb {
                let bytes = kb
                    .checked_mul(1024)
                    .ok_or_else(|| out_of_range("file_size_limit_kb", kb))?;
                config.limits.file_size_limit = Some(bytes);
            }
            if let Some(fds) = limits.fd_limit {
                config.limits.fd_limit = Some(fds);
            }
            if let Some(procs) = limits.process_limit {
                config.limits.process_limit = Some(procs);
            }
            if let Some(kb) = limits.output_limit_kb {
                config.limits.output_limit = kb
                    .checked_mul(1024)
                    .ok_or_else(|| out_of_range("output_limit_kb", kb))?;
            }
        }
        Ok(())
    }
}

/// Build the effective config: defaults, then `path` (or ./synthbox.json).
pub fn load_config(path: Option<&Path>) -> Result<EvaluatorConfig> {
    let overrides = match path {
        Some(path) => HarnessConfigFile::load_from_file(path)?,
        None => HarnessConfigFile::load_default()?,
    };
    let mut config = EvaluatorConfig::default();
    overrides.apply_to(&mut config)?;
    Ok(config)
}
