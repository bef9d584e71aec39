//! Observability
//!
//! Structured audit events for evaluations and batch runs.

pub mod audit;
