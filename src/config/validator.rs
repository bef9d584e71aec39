// Startup validation for evaluator configs.
// Errors are fatal; warnings are logged and execution continues.

use crate::config::types::{EvaluatorConfig, Result, SynthError, NUMERIC_MODULES};
use crate::core::seccomp;

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate the effective config, failing on the first report with errors.
pub fn validate_config(config: &EvaluatorConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::default();

    validate_timeout(config, &mut result);
    validate_names(config, &mut result);
    validate_modules(config, &mut result);
    validate_limits(config, &mut result);

    for warning in &result.warnings {
        log::warn!("config: {}", warning);
    }

    if !result.is_valid() {
        return Err(SynthError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_timeout(config: &EvaluatorConfig, result: &mut ValidationResult) {
    if config.timeout.is_zero() {
        result.add_error("timeout must be positive".to_string());
    }
    if let Some(cpu) = config.limits.cpu_time_limit_secs {
        if cpu == 0 {
            result.add_error("cpu_time_limit_secs must be positive when set".to_string());
        } else if (cpu as f64) < config.timeout.as_secs_f64() {
            result.add_warning(format!(
                "cpu limit {}s is below the wall-clock timeout {:.1}s; CPU-bound candidates die by SIGXCPU first",
                cpu,
                config.timeout.as_secs_f64()
            ));
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn validate_names(config: &EvaluatorConfig, result: &mut ValidationResult) {
    if !is_identifier(&config.entry_point) {
        result.add_error(format!(
            "entry_point '{}' is not a valid identifier",
            config.entry_point
        ));
    }
    if config.input_marker.is_empty() {
        result.add_error("input_marker must not be empty".to_string());
    }
}

fn validate_modules(config: &EvaluatorConfig, result: &mut ValidationResult) {
    for module in &config.allowed_modules {
        if !NUMERIC_MODULES.contains(&module.as_str()) {
            result.add_error(format!(
                "module '{}' is not numeric; allowed: {}",
                module,
                NUMERIC_MODULES.join(", ")
            ));
        }
    }
}

fn validate_limits(config: &EvaluatorConfig, result: &mut ValidationResult) {
    if let Some(mem) = config.limits.memory_limit {
        if mem < 64 * 1024 * 1024 {
            result.add_warning(format!(
                "memory limit {} bytes is likely too small for the interpreter to start",
                mem
            ));
        }
    }
    if let Some(fds) = config.limits.fd_limit {
        if fds < 8 {
            result.add_error(format!("fd_limit {} leaves no room for the worker pipes", fds));
        }
    }
    if config.limits.output_limit == 0 {
        result.add_error("output_limit must be positive".to_string());
    }
    if config.limits.process_limit == Some(0) {
        result.add_error("process_limit must be positive when set".to_string());
    }
    if !config.enable_network_namespace {
        result.add_warning("network namespace disabled; candidates keep host networking".to_string());
    }
    if !config.enable_pid_namespace {
        result.add_warning(
            "pid namespace disabled; a candidate that leaves its process group can outlive teardown"
                .to_string(),
        );
    }
    if !config.enable_syscall_filter {
        result.add_warning("syscall filter disabled; the import guard is the only barrier".to_string());
    } else if !seccomp::is_supported() {
        result.add_warning("seccomp unavailable on this host; syscall filter cannot be installed".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&EvaluatorConfig::default()).is_ok());
    }

    #[test]
    fn rejects_non_numeric_modules() {
        let mut config = EvaluatorConfig::default();
        config.allowed_modules.push("os".to_string());
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("'os'"));
    }

    #[test]
    fn rejects_zero_timeout_and_bad_entry_point() {
        let mut config = EvaluatorConfig::default();
        config.timeout = Duration::ZERO;
        config.entry_point = "my func".to_string();
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("timeout"));
        assert!(err.contains("identifier"));
    }

    #[test]
    fn disabled_isolation_only_warns() {
        let mut config = EvaluatorConfig::default();
        config.enable_pid_namespace = false;
        config.enable_syscall_filter = false;
        let result = validate_config(&config).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("pid namespace")));
        assert!(result.warnings.iter().any(|w| w.contains("syscall filter")));
    }

    #[test]
    fn zero_process_limit_is_rejected() {
        let mut config = EvaluatorConfig::default();
        config.limits.process_limit = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn identifier_check() {
        assert!(is_identifier("my_func"));
        assert!(is_identifier("_f2"));
        assert!(!is_identifier("2f"));
        assert!(!is_identifier(""));
    }
}
