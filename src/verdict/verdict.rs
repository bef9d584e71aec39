//! Verdict classification.
//!
//! A pure function over the worker outcome and the expected table: the same
//! evidence always yields the same status and score.

use crate::config::types::EvaluationStatus;
use crate::core::types::{WorkerOutcome, WorkerReply};
use crate::dataset::Column;
use crate::verdict::score::{score_outputs, ScoreCard};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: EvaluationStatus,
    pub score: f64,
    pub card: Option<ScoreCard>,
    /// Human-readable cause for non-OK verdicts.
    pub detail: Option<String>,
}

impl Verdict {
    fn failed(status: EvaluationStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            score: 0.0,
            card: None,
            detail: Some(detail.into()),
        }
    }
}

pub struct VerdictClassifier;

impl VerdictClassifier {
    pub fn classify(outcome: &WorkerOutcome, columns: &[Column], expected: &[Vec<String>]) -> Verdict {
        // The supervisor's own kill takes precedence over anything the worker
        // managed to write before it.
        if outcome.timed_out {
            return Verdict::failed(
                EvaluationStatus::ExecutionTimeout,
                format!("killed after {} ms", outcome.wall_time_ms),
            );
        }

        match &outcome.reply {
            Some(reply) => Self::classify_reply(reply, columns, expected),
            None => Self::classify_silent_exit(outcome),
        }
    }

    fn classify_reply(reply: &WorkerReply, columns: &[Column], expected: &[Vec<String>]) -> Verdict {
        match reply {
            WorkerReply::Ok { outputs } => match score_outputs(columns, expected, outputs) {
                Ok(card) => Verdict {
                    status: EvaluationStatus::Ok,
                    score: card.score,
                    card: Some(card),
                    detail: None,
                },
                Err(mismatch) => Verdict::failed(
                    EvaluationStatus::ShapeMismatch,
                    match mismatch.row {
                        Some(row) => format!(
                            "row {row}: expected {} values, got {}",
                            mismatch.expected, mismatch.actual
                        ),
                        None => format!(
                            "expected {} rows, got {}",
                            mismatch.expected, mismatch.actual
                        ),
                    },
                ),
            },
            WorkerReply::CompileError { detail } => {
                Verdict::failed(EvaluationStatus::CompileFailure, detail.clone())
            }
            WorkerReply::EntryPointMissing { detail } => {
                Verdict::failed(EvaluationStatus::EntryPointMissing, detail.clone())
            }
            WorkerReply::RuntimeError { row, detail } => {
                Verdict::failed(EvaluationStatus::RuntimeFailure, format!("row {row}: {detail}"))
            }
            WorkerReply::ShapeMismatch {
                row,
                expected,
                actual,
            } => Verdict::failed(
                EvaluationStatus::ShapeMismatch,
                format!("row {row}: expected {expected} values, got {actual}"),
            ),
        }
    }

    /// Worker exited without a usable reply: killed by a kernel limit,
    /// crashed the interpreter, or flooded its reply channel.
    fn classify_silent_exit(outcome: &WorkerOutcome) -> Verdict {
        let cause = outcome
            .protocol_error
            .clone()
            .unwrap_or_else(|| "no reply".to_string());

        match outcome.term_signal {
            // RLIMIT_CPU: SIGXCPU at the soft limit, SIGKILL at the hard one.
            Some(sig) if sig == libc::SIGXCPU || sig == libc::SIGKILL => Verdict::failed(
                EvaluationStatus::ExecutionTimeout,
                format!("terminated by signal {sig} ({cause})"),
            ),
            Some(sig) => Verdict::failed(
                EvaluationStatus::WorkerFailure,
                format!("terminated by signal {sig} ({cause})"),
            ),
            None => Verdict::failed(
                EvaluationStatus::WorkerFailure,
                format!(
                    "exit code {} ({cause})",
                    outcome.exit_code.map_or("?".to_string(), |c| c.to_string())
                ),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{KillReport, OutputIntegrity};
    use crate::dataset::ColumnKind;

    fn outcome(reply: Option<WorkerReply>) -> WorkerOutcome {
        WorkerOutcome {
            worker_pid: 1,
            exit_code: Some(0),
            term_signal: None,
            timed_out: false,
            wall_time_ms: 12,
            reply,
            protocol_error: None,
            stdout_integrity: OutputIntegrity::Complete,
            stderr_tail: String::new(),
            teardown: KillReport::default(),
            configured_controls: Vec::new(),
        }
    }

    fn output_column() -> Vec<Column> {
        vec![Column {
            name: "output".to_string(),
            kind: ColumnKind::Integer,
        }]
    }

    fn expected() -> Vec<Vec<String>> {
        vec![vec!["2".to_string()], vec!["4".to_string()]]
    }

    #[test]
    fn ok_reply_is_scored() {
        let reply = WorkerReply::Ok {
            outputs: vec![vec!["2".to_string()], vec!["3".to_string()]],
        };
        let verdict = VerdictClassifier::classify(&outcome(Some(reply)), &output_column(), &expected());
        assert_eq!(verdict.status, EvaluationStatus::Ok);
        assert_eq!(verdict.score, 0.5);
    }

    #[test]
    fn timeout_wins_over_any_reply() {
        let mut run = outcome(Some(WorkerReply::Ok {
            outputs: expected(),
        }));
        run.timed_out = true;
        run.term_signal = Some(libc::SIGKILL);
        let verdict = VerdictClassifier::classify(&run, &output_column(), &expected());
        assert_eq!(verdict.status, EvaluationStatus::ExecutionTimeout);
        assert_eq!(verdict.score, 0.0);
    }

    #[test]
    fn candidate_failures_score_zero() {
        let replies = [
            (
                WorkerReply::CompileError {
                    detail: "SyntaxError".to_string(),
                },
                EvaluationStatus::CompileFailure,
            ),
            (
                WorkerReply::EntryPointMissing {
                    detail: "no callable".to_string(),
                },
                EvaluationStatus::EntryPointMissing,
            ),
            (
                WorkerReply::RuntimeError {
                    row: 1,
                    detail: "ZeroDivisionError".to_string(),
                },
                EvaluationStatus::RuntimeFailure,
            ),
            (
                WorkerReply::ShapeMismatch {
                    row: 0,
                    expected: 2,
                    actual: 1,
                },
                EvaluationStatus::ShapeMismatch,
            ),
        ];
        for (reply, status) in replies {
            let verdict = VerdictClassifier::classify(&outcome(Some(reply)), &output_column(), &expected());
            assert_eq!(verdict.status, status);
            assert_eq!(verdict.score, 0.0);
            assert!(verdict.detail.is_some());
        }
    }

    #[test]
    fn short_ok_reply_is_a_shape_mismatch() {
        let reply = WorkerReply::Ok {
            outputs: vec![vec!["2".to_string()]],
        };
        let verdict = VerdictClassifier::classify(&outcome(Some(reply)), &output_column(), &expected());
        assert_eq!(verdict.status, EvaluationStatus::ShapeMismatch);
    }

    #[test]
    fn cpu_limit_kill_is_a_timeout() {
        let mut run = outcome(None);
        run.exit_code = None;
        run.term_signal = Some(libc::SIGXCPU);
        let verdict = VerdictClassifier::classify(&run, &output_column(), &expected());
        assert_eq!(verdict.status, EvaluationStatus::ExecutionTimeout);
    }

    #[test]
    fn silent_nonzero_exit_is_a_worker_failure() {
        let mut run = outcome(None);
        run.exit_code = Some(1);
        run.protocol_error = Some("worker produced no reply".to_string());
        let verdict = VerdictClassifier::classify(&run, &output_column(), &expected());
        assert_eq!(verdict.status, EvaluationStatus::WorkerFailure);
        assert_eq!(verdict.score, 0.0);
        assert!(verdict.detail.unwrap().contains("exit code 1"));
    }
}
