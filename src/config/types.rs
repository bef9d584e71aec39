use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Entry-point name candidates must define.
pub const DEFAULT_ENTRY_POINT: &str = "my_func";

/// Column-name prefix marking dataset inputs.
pub const DEFAULT_INPUT_MARKER: &str = "input";

/// Modules candidate code may import. Everything outside this list is refused
/// by the worker, and the config validator refuses to widen it.
pub const NUMERIC_MODULES: &[&str] = &["math", "cmath", "numpy", "fractions", "decimal", "statistics"];

/// Outcome class of one evaluation.
///
/// Everything except `Ok` scores 0.0. Serialized with short judge-style codes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluationStatus {
    /// Candidate ran on every row; the score reflects agreement.
    #[serde(rename = "OK")]
    Ok,
    /// Candidate text did not parse, or its module body raised.
    #[serde(rename = "CE")]
    CompileFailure,
    /// No callable bound to the entry-point name.
    #[serde(rename = "EPM")]
    EntryPointMissing,
    /// Entry point raised on some row.
    #[serde(rename = "RE")]
    RuntimeFailure,
    /// A row produced a different number of values than output columns.
    #[serde(rename = "SM")]
    ShapeMismatch,
    /// Worker exceeded its wall-clock budget and was killed.
    #[serde(rename = "TLE")]
    ExecutionTimeout,
    /// Worker died or replied with something unreadable.
    #[serde(rename = "WF")]
    WorkerFailure,
}

impl EvaluationStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, EvaluationStatus::Ok)
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationStatus::Ok => write!(f, "OK"),
            EvaluationStatus::CompileFailure => write!(f, "CE"),
            EvaluationStatus::EntryPointMissing => write!(f, "EPM"),
            EvaluationStatus::RuntimeFailure => write!(f, "RE"),
            EvaluationStatus::ShapeMismatch => write!(f, "SM"),
            EvaluationStatus::ExecutionTimeout => write!(f, "TLE"),
            EvaluationStatus::WorkerFailure => write!(f, "WF"),
        }
    }
}

/// Kernel-level limits applied to every worker before it execs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SandboxLimits {
    /// Address-space ceiling in bytes
    pub memory_limit: Option<u64>,
    /// CPU seconds (RLIMIT_CPU); a backstop behind the wall-clock timeout
    pub cpu_time_limit_secs: Option<u64>,
    /// Largest file the worker may create; 0 forbids writes to regular files
    pub file_size_limit: Option<u64>,
    /// Max open file descriptors
    pub fd_limit: Option<u64>,
    /// Max processes for the worker's user (RLIMIT_NPROC)
    pub process_limit: Option<u64>,
    /// Core dump size (0 disables core dumps)
    pub core_limit: Option<u64>,
    /// Cap on worker stdout/stderr collected by the supervisor (bytes)
    pub output_limit: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_limit: Some(1024 * 1024 * 1024),
            cpu_time_limit_secs: Some(60),
            file_size_limit: Some(0),
            fd_limit: Some(64),
            process_limit: Some(64),
            core_limit: Some(0),
            output_limit: 16 * 1024 * 1024,
        }
    }
}

/// Evaluator configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Language adapter used to run candidates
    pub language: String,
    /// Interpreter executable for the worker
    pub runtime_path: PathBuf,
    /// Fixed entry-point name
    pub entry_point: String,
    /// Dataset column prefix marking inputs
    pub input_marker: String,
    /// Modules the candidate may import
    pub allowed_modules: Vec<String>,
    /// Wall-clock budget for one evaluation
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Strict mode: refuse to run if any sandbox control cannot be applied
    pub strict_mode: bool,
    /// Put the worker in a private network namespace
    pub enable_network_namespace: bool,
    /// Run the worker as init of a fresh PID namespace
    pub enable_pid_namespace: bool,
    /// Install the launch and lockdown syscall filters
    pub enable_syscall_filter: bool,
    pub limits: SandboxLimits,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            language: "python".to_string(),
            runtime_path: PathBuf::from("/usr/bin/python3"),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            input_marker: DEFAULT_INPUT_MARKER.to_string(),
            allowed_modules: vec!["math".to_string(), "numpy".to_string()],
            timeout: Duration::from_secs(10),
            strict_mode: false,
            enable_network_namespace: true,
            enable_pid_namespace: true,
            enable_syscall_filter: true,
            limits: SandboxLimits::default(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Errors surfaced to callers. Candidate misbehaviour is never one of these;
/// it is an [`EvaluationStatus`] with score 0.0.
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Worker protocol error: {0}")]
    Protocol(String),

    #[error("Candidate error: {0}")]
    Candidate(String),
}

/// Result type alias for synthbox operations
pub type Result<T> = std::result::Result<T, SynthError>;
