//! Structured audit trail.
//!
//! One JSON object per line: evaluation start/end, forced kills, and batch
//! iterations that could not be scored. Events carry correlation ids so a
//! score in a results CSV can be traced back to the worker that produced it.
//! Without an initialized logger, events are routed through `log`.

use crate::config::types::{EvaluationStatus, Result, SynthError};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditSeverity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    EvaluationStart,
    EvaluationEnd,
    /// Worker outlived its wall-clock budget and its group was killed.
    ForcedKill,
    /// Worker died without a reply or with an unreadable one.
    WorkerFailure,
    /// A batch iteration had no usable response log.
    IterationSkipped,
    /// A batch iteration errored during evaluation and counts as unsolved.
    IterationFailure,
}

impl AuditEventType {
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            AuditEventType::EvaluationStart | AuditEventType::EvaluationEnd => AuditSeverity::Low,
            AuditEventType::ForcedKill | AuditEventType::IterationSkipped => AuditSeverity::Medium,
            AuditEventType::WorkerFailure | AuditEventType::IterationFailure => AuditSeverity::High,
        }
    }
}

/// Identifiers tying an event to one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationIds {
    pub evaluation_id: String,
    /// SHA-256 of the candidate source.
    pub candidate_digest: String,
    pub worker_pid: Option<i32>,
}

impl CorrelationIds {
    pub fn new(candidate_digest: impl Into<String>) -> Self {
        Self {
            evaluation_id: Uuid::new_v4().to_string(),
            candidate_digest: candidate_digest.into(),
            worker_pid: None,
        }
    }

    pub fn with_worker_pid(mut self, pid: i32) -> Self {
        self.worker_pid = Some(pid);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationIds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EvaluationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iteration: Option<usize>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, details: impl Into<String>) -> Self {
        let severity = event_type.default_severity();
        Self {
            event_type,
            severity,
            timestamp: Utc::now(),
            details: details.into(),
            correlation: None,
            status: None,
            score: None,
            task: None,
            iteration: None,
        }
    }

    pub fn with_correlation(mut self, correlation: CorrelationIds) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn with_status(mut self, status: EvaluationStatus, score: f64) -> Self {
        self.status = Some(status);
        self.score = Some(score);
        self
    }

    pub fn with_iteration(mut self, task: impl Into<String>, iteration: usize) -> Self {
        self.task = Some(task.into());
        self.iteration = Some(iteration);
        self
    }

    fn summary(&self) -> String {
        format!("{:?} - {}", self.event_type, self.details)
    }
}

/// File-backed audit sink.
pub struct AuditLogger {
    audit_file: Mutex<File>,
    audit_path: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_path: Option<PathBuf>) -> Result<Self> {
        let audit_path = audit_path
            .unwrap_or_else(|| std::env::temp_dir().join("synthbox").join("audit.jsonl"));

        if let Some(parent) = audit_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SynthError::Config(format!("Failed to create audit log directory: {}", e))
            })?;
        }

        let audit_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&audit_path)
            .map_err(|e| SynthError::Config(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            audit_file: Mutex::new(audit_file),
            audit_path,
        })
    }

    pub fn log_event(&self, event: &AuditEvent) {
        log_to_facade(event);

        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode audit event: {}", e);
                return;
            }
        };
        match self.audit_file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
                    error!("Failed to write audit log: {}", e);
                }
            }
            Err(_) => error!("Failed to acquire lock on audit file"),
        }
    }

    pub fn audit_path(&self) -> &Path {
        &self.audit_path
    }
}

fn log_to_facade(event: &AuditEvent) {
    match event.severity {
        AuditSeverity::High => warn!("AUDIT: {}", event.summary()),
        AuditSeverity::Medium => info!("AUDIT: {}", event.summary()),
        AuditSeverity::Low => log::debug!("AUDIT: {}", event.summary()),
    }
}

static AUDIT_LOGGER: OnceLock<AuditLogger> = OnceLock::new();

/// Install the global audit sink. A second call is ignored with an error log.
pub fn init_audit_logger(audit_path: Option<PathBuf>) -> Result<()> {
    let logger = AuditLogger::new(audit_path)?;
    let path = logger.audit_path().to_path_buf();
    if AUDIT_LOGGER.set(logger).is_err() {
        error!("Audit logger already initialized");
    } else {
        info!("Audit log at {}", path.display());
    }
    Ok(())
}

pub fn log_audit_event(event: AuditEvent) {
    match AUDIT_LOGGER.get() {
        Some(logger) => logger.log_event(&event),
        None => log_to_facade(&event),
    }
}

/// Convenience constructors for common events.
pub mod events {
    use super::*;

    pub fn evaluation_start(correlation: &CorrelationIds, rows: usize, timeout_secs: f64) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::EvaluationStart,
                format!("{} rows, timeout {:.3}s", rows, timeout_secs),
            )
            .with_correlation(correlation.clone()),
        );
    }

    pub fn evaluation_end(
        correlation: &CorrelationIds,
        status: &EvaluationStatus,
        score: f64,
        wall_time_ms: u64,
    ) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::EvaluationEnd,
                format!("{} score={} in {} ms", status, score, wall_time_ms),
            )
            .with_correlation(correlation.clone())
            .with_status(status.clone(), score),
        );
    }

    pub fn forced_kill(correlation: &CorrelationIds, wall_time_ms: u64) {
        log_audit_event(
            AuditEvent::new(
                AuditEventType::ForcedKill,
                format!("worker group killed after {} ms", wall_time_ms),
            )
            .with_correlation(correlation.clone()),
        );
    }

    pub fn worker_failure(correlation: &CorrelationIds, detail: &str) {
        log_audit_event(
            AuditEvent::new(AuditEventType::WorkerFailure, detail.to_string())
                .with_correlation(correlation.clone()),
        );
    }

    pub fn iteration_skipped(task: &str, iteration: usize, reason: &str) {
        log_audit_event(
            AuditEvent::new(AuditEventType::IterationSkipped, reason.to_string())
                .with_iteration(task, iteration),
        );
    }

    pub fn iteration_failure(task: &str, iteration: usize, reason: &str) {
        log_audit_event(
            AuditEvent::new(AuditEventType::IterationFailure, reason.to_string())
                .with_iteration(task, iteration),
        );
    }
}
