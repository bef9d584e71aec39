use crate::config::types::{EvaluatorConfig, SandboxLimits};
use crate::core::seccomp::BpfInstruction;
use crate::dataset::Cell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Everything the supervisor needs to launch one worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub command: Vec<String>,
    pub environment: Vec<(String, String)>,
    pub workdir: PathBuf,
    pub wall_time_limit: Duration,
    pub strict_mode: bool,
    pub enable_network_namespace: bool,
    pub enable_pid_namespace: bool,
    pub enable_syscall_filter: bool,
    pub limits: SandboxLimits,
}

impl WorkerProfile {
    pub fn from_config(
        config: &EvaluatorConfig,
        command: Vec<String>,
        environment: Vec<(String, String)>,
        wall_time_limit: Duration,
    ) -> Self {
        Self {
            command,
            environment,
            workdir: std::env::temp_dir(),
            wall_time_limit,
            strict_mode: config.strict_mode,
            enable_network_namespace: config.enable_network_namespace,
            enable_pid_namespace: config.enable_pid_namespace,
            enable_syscall_filter: config.enable_syscall_filter,
            limits: config.limits.clone(),
        }
    }

    /// Controls this profile asks the kernel for, in application order.
    pub fn configured_controls(&self) -> Vec<String> {
        let mut controls = vec![
            "process_group".to_string(),
            "no_new_privileges".to_string(),
            "parent_death_signal".to_string(),
        ];
        if self.limits.memory_limit.is_some() {
            controls.push("memory_limit".to_string());
        }
        if self.limits.cpu_time_limit_secs.is_some() {
            controls.push("cpu_time_limit".to_string());
        }
        if self.limits.file_size_limit.is_some() {
            controls.push("file_size_limit".to_string());
        }
        if self.limits.fd_limit.is_some() {
            controls.push("fd_limit".to_string());
        }
        if self.limits.process_limit.is_some() {
            controls.push("process_limit".to_string());
        }
        if self.enable_network_namespace {
            controls.push("network_namespace".to_string());
        }
        if self.enable_pid_namespace {
            controls.push("pid_namespace".to_string());
        }
        if self.enable_syscall_filter {
            controls.push("syscall_filter".to_string());
        }
        controls
    }
}

/// Supervisor -> worker request, written once to the worker's stdin.
#[derive(Debug, Serialize)]
pub struct WorkerRequest<'a> {
    pub source: &'a str,
    pub entry_point: &'a str,
    pub inputs: Vec<&'a [Cell]>,
    pub output_arity: usize,
    pub allowed_modules: &'a [String],
    /// Filter the harness installs before running candidate code; empty
    /// when filtering is off.
    pub lockdown: &'a [BpfInstruction],
    /// Refuse to run the candidate if the lockdown cannot be installed.
    pub strict: bool,
}

/// Worker -> supervisor reply, the single message on the worker's stdout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    Ok {
        outputs: Vec<Vec<String>>,
    },
    CompileError {
        detail: String,
    },
    EntryPointMissing {
        detail: String,
    },
    RuntimeError {
        row: usize,
        detail: String,
    },
    ShapeMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputIntegrity {
    Complete,
    TruncatedByLimit,
    ReadError,
    /// The stream never closed within the collection window.
    Abandoned,
}

/// Report of the group SIGKILL issued at teardown.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct KillReport {
    pub kill_sent: bool,
    pub waited_ms: u64,
    pub notes: Vec<String>,
}

/// Raw evidence about one worker run. Classification happens in `verdict`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub worker_pid: i32,
    pub exit_code: Option<i32>,
    pub term_signal: Option<i32>,
    pub timed_out: bool,
    pub wall_time_ms: u64,
    pub reply: Option<WorkerReply>,
    pub protocol_error: Option<String>,
    pub stdout_integrity: OutputIntegrity,
    /// Tail of the worker's stderr, for diagnostics only.
    pub stderr_tail: String,
    /// Group kill issued after every run, timed out or not.
    pub teardown: KillReport,
    pub configured_controls: Vec<String>,
}
