//! Verdict classification and scoring.
//!
//! Derives the evaluation status and score as pure functions over the worker
//! outcome and the expected outputs.

pub mod score;
pub mod verdict;

pub use score::{score_outputs, ColumnAgreement, ScoreCard, ShapeMismatch};
pub use verdict::{Verdict, VerdictClassifier};
