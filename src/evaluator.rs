//! Sandboxed candidate evaluator.
//!
//! `evaluate` is total over candidate behaviour: whatever the candidate does,
//! the caller gets a score in [0, 1]. `Err` is reserved for caller misuse and
//! for a worker runtime that cannot be started at all.

use crate::candidate::CandidateProgram;
use crate::config::types::{EvaluationStatus, EvaluatorConfig, Result, SynthError};
use crate::config::validator::validate_config;
use crate::core::seccomp::{self, BpfInstruction};
use crate::core::supervisor::run_worker;
use crate::core::types::{WorkerProfile, WorkerRequest};
use crate::dataset::DatasetSplit;
use crate::judge::{adapter_for, CandidateAdapter};
use crate::observability::audit::{events, CorrelationIds};
use crate::verdict::{ColumnAgreement, VerdictClassifier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::process::Command;
use std::time::Duration;

/// Full result of one evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub evaluation_id: String,
    pub candidate_digest: String,
    pub status: EvaluationStatus,
    /// Minimum per-column agreement; 0.0 unless `status` is OK.
    pub score: f64,
    pub columns: Vec<ColumnAgreement>,
    pub detail: Option<String>,
    pub rows: usize,
    pub wall_time_ms: u64,
    pub worker_pid: i32,
}

impl Evaluation {
    /// Every row matched on every output column.
    pub fn solved(&self) -> bool {
        self.score == 1.0
    }
}

/// What `check-deps` reports about the worker runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeReport {
    pub version: String,
    pub modules: BTreeMap<String, bool>,
}

pub struct Evaluator {
    config: EvaluatorConfig,
    adapter: Box<dyn CandidateAdapter>,
    lockdown: Vec<BpfInstruction>,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Result<Self> {
        validate_config(&config)?;
        let adapter = adapter_for(&config.language)?;
        let lockdown = if config.enable_syscall_filter {
            seccomp::lockdown_filter()
        } else {
            Vec::new()
        };
        Ok(Self {
            config,
            adapter,
            lockdown,
        })
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluate with the configured timeout.
    pub fn evaluate(&self, candidate_text: &str, split: &DatasetSplit) -> Result<Evaluation> {
        self.evaluate_with_timeout(candidate_text, split, self.config.timeout)
    }

    /// Run the candidate against every row of `split` in a fresh worker that
    /// is killed after `timeout` of wall-clock time.
    pub fn evaluate_with_timeout(
        &self,
        candidate_text: &str,
        split: &DatasetSplit,
        timeout: Duration,
    ) -> Result<Evaluation> {
        if timeout.is_zero() {
            return Err(SynthError::Config("timeout must be positive".to_string()));
        }
        if split.is_empty() {
            return Err(SynthError::Dataset("split has no rows".to_string()));
        }
        if split.output_columns().is_empty() {
            return Err(SynthError::Dataset("split has no output columns".to_string()));
        }

        let program = CandidateProgram::new(candidate_text, self.config.entry_point.as_str());
        let correlation = CorrelationIds::new(program.digest());
        events::evaluation_start(&correlation, split.len(), timeout.as_secs_f64());

        let request = WorkerRequest {
            source: &program.source,
            entry_point: &program.entry_point,
            inputs: split.input_matrix(),
            output_arity: split.output_columns().len(),
            allowed_modules: &self.config.allowed_modules,
            lockdown: &self.lockdown,
            strict: self.config.strict_mode,
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| SynthError::Protocol(format!("encode request: {}", e)))?;

        let profile = WorkerProfile::from_config(
            &self.config,
            self.adapter.worker_command(&self.config.runtime_path),
            self.adapter.worker_environment(),
            timeout,
        );
        let outcome = run_worker(&profile, payload)?;
        let correlation = correlation.with_worker_pid(outcome.worker_pid);

        let verdict =
            VerdictClassifier::classify(&outcome, split.output_columns(), &split.expected_texts());

        if outcome.timed_out {
            events::forced_kill(&correlation, outcome.wall_time_ms);
        }
        if verdict.status == EvaluationStatus::WorkerFailure {
            let detail = verdict.detail.as_deref().unwrap_or("worker failure");
            events::worker_failure(&correlation, detail);
            if !outcome.stderr_tail.is_empty() {
                log::debug!("worker {} stderr: {}", outcome.worker_pid, outcome.stderr_tail);
            }
        }
        events::evaluation_end(&correlation, &verdict.status, verdict.score, outcome.wall_time_ms);

        Ok(Evaluation {
            evaluation_id: correlation.evaluation_id,
            candidate_digest: correlation.candidate_digest,
            status: verdict.status,
            score: verdict.score,
            columns: verdict.card.map(|card| card.columns).unwrap_or_default(),
            detail: verdict.detail,
            rows: split.len(),
            wall_time_ms: outcome.wall_time_ms,
            worker_pid: outcome.worker_pid,
        })
    }

    /// Ask the runtime for its version and which allowed modules it can load.
    pub fn check_runtime(&self) -> Result<RuntimeReport> {
        let argv = self
            .adapter
            .probe_command(&self.config.runtime_path, &self.config.allowed_modules);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SynthError::Config("empty probe command".to_string()))?;

        let output = Command::new(program)
            .args(args)
            .env_clear()
            .envs(self.adapter.worker_environment())
            .output()
            .map_err(|e| {
                SynthError::Process(format!("cannot run {}: {}", self.config.runtime_path.display(), e))
            })?;
        if !output.status.success() {
            return Err(SynthError::Process(format!(
                "runtime probe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| SynthError::Protocol(format!("runtime probe reply: {}", e)))
    }
}

/// Score `candidate_text` against `split` under the default configuration.
///
/// Returns 0.0 for any candidate failure; see [`Evaluator::evaluate`] for the
/// detailed result.
pub fn evaluate(candidate_text: &str, split: &DatasetSplit, timeout_seconds: f64) -> Result<f64> {
    let timeout = Duration::try_from_secs_f64(timeout_seconds)
        .map_err(|e| SynthError::Config(format!("invalid timeout {}: {}", timeout_seconds, e)))?;
    let evaluator = Evaluator::new(EvaluatorConfig::default())?;
    Ok(evaluator
        .evaluate_with_timeout(candidate_text, split, timeout)?
        .score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split() -> DatasetSplit {
        DatasetSplit::from_reader("input1,output1\n1,2\n".as_bytes(), "input").unwrap()
    }

    #[test]
    fn rejects_non_positive_timeouts() {
        assert!(matches!(evaluate("", &split(), 0.0), Err(SynthError::Config(_))));
        assert!(matches!(evaluate("", &split(), -1.0), Err(SynthError::Config(_))));
        assert!(matches!(
            evaluate("", &split(), f64::NAN),
            Err(SynthError::Config(_))
        ));
    }

    #[test]
    fn rejects_splits_without_outputs() {
        let inputs_only = DatasetSplit::from_reader("input1\n1\n".as_bytes(), "input").unwrap();
        let evaluator = Evaluator::new(EvaluatorConfig::default()).unwrap();
        assert!(matches!(
            evaluator.evaluate("def my_func(x): return x", &inputs_only),
            Err(SynthError::Dataset(_))
        ));
    }

    #[test]
    fn rejects_empty_splits() {
        let empty = DatasetSplit::from_reader("input1,output1\n".as_bytes(), "input").unwrap();
        let evaluator = Evaluator::new(EvaluatorConfig::default()).unwrap();
        assert!(matches!(
            evaluator.evaluate("def my_func(x): return x", &empty),
            Err(SynthError::Dataset(_))
        ));
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut config = EvaluatorConfig::default();
        config.entry_point = "not an identifier".to_string();
        assert!(matches!(Evaluator::new(config), Err(SynthError::Config(_))));

        let mut config = EvaluatorConfig::default();
        config.language = "cobol".to_string();
        assert!(matches!(Evaluator::new(config), Err(SynthError::Config(_))));
    }

    #[test]
    fn lockdown_follows_the_filter_switch() {
        let evaluator = Evaluator::new(EvaluatorConfig::default()).unwrap();
        assert_eq!(evaluator.lockdown, seccomp::lockdown_filter());

        let mut config = EvaluatorConfig::default();
        config.enable_syscall_filter = false;
        let evaluator = Evaluator::new(config).unwrap();
        assert!(evaluator.lockdown.is_empty());
    }

    #[test]
    fn missing_runtime_is_a_process_error() {
        let mut config = EvaluatorConfig::default();
        config.runtime_path = "/nonexistent/python3".into();
        config.enable_network_namespace = false;
        config.enable_pid_namespace = false;
        let evaluator = Evaluator::new(config).unwrap();
        assert!(matches!(
            evaluator.evaluate("def my_func(x): return x", &split()),
            Err(SynthError::Process(_))
        ));
    }
}
