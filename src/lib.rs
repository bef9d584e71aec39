//! synthbox: sandboxed scoring of synthesized programs against PSB2 splits.
//!
//! A candidate program is run in a fresh worker process per evaluation, fed
//! every row of a dataset split, and scored by exact text agreement with the
//! expected outputs. Whatever the candidate does, the caller gets a score.
//!
//! # Architecture
//!
//! ## Evaluation ([`evaluator`])
//! - [`evaluator::evaluate`]: `(program text, split, timeout) -> score`
//! - [`evaluator::Evaluator`]: the same with full status, timing and per-column detail
//!
//! ## Worker Runtime ([`core`])
//! - [`core::supervisor`]: spawn, watch, group-kill and reap one worker
//! - [`core::preexec`]: rlimits, network and PID namespaces, no-new-privs before exec
//! - [`core::seccomp`]: launch and lockdown syscall filters
//! - [`core::types`]: worker profile, wire protocol and outcome evidence
//!
//! ## Candidate Adapters ([`judge`])
//! - [`judge::languages::python`]: Python worker with an import-guarded harness
//! - [`judge::registry`]: language name to adapter
//!
//! ## Verdict ([`verdict`])
//! - [`verdict::verdict`]: status classification from worker evidence
//! - [`verdict::score`]: per-column agreement and minimum aggregation
//!
//! ## Data ([`dataset`], [`candidate`])
//! - [`dataset::table`]: CSV tables and typed input/output splits
//! - [`dataset::cell`]: column type inference and value normalization
//! - [`dataset::split`]: seeded PSB2 train/test generation
//! - [`candidate`]: program extraction from model responses and response logs
//!
//! ## Driver ([`batch`], [`cli`])
//! - [`batch`]: post-hoc scoring of logged responses with solved counts
//! - [`cli`]: `synthbox` command line
//!
//! ## Configuration & Observability ([`config`], [`observability`])
//! - [`config::types`]: config, limits, status codes and the crate error type
//! - [`config::loader`]: `synthbox.json` overrides
//! - [`config::validator`]: startup validation
//! - [`observability::audit`]: JSON-lines audit trail

// Configuration, shared types and errors
pub mod config;

// Dataset provider
pub mod dataset;

// Candidate source
pub mod candidate;

// Language-agnostic worker runtime
pub mod core;

// Candidate adapters (language-specific worker commands)
pub mod judge;

// Verdict & scoring
pub mod verdict;

// Evaluator entry point
pub mod evaluator;

// Observability
pub mod observability;

// Post-hoc batch driver
pub mod batch;

// CLI entrypoint wiring for the synthbox binary.
pub mod cli;

pub use config::types::{EvaluationStatus, EvaluatorConfig, Result, SynthError};
pub use evaluator::{evaluate, Evaluation, Evaluator};
