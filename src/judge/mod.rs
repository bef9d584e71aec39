//! Candidate adapters.
//!
//! The worker runtime stays language-agnostic. An adapter knows how to start
//! a worker that reads one request, loads the candidate, and replies once.

pub mod adapter;
pub mod languages;
pub mod registry;

pub use adapter::CandidateAdapter;
pub use registry::adapter_for;
