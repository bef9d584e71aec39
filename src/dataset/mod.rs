//! Dataset provider
//!
//! CSV loading, input/output column partitioning, per-column typing, and
//! PSB2 split generation. The evaluator only ever reads a materialized
//! [`DatasetSplit`].

pub mod cell;
pub mod split;
pub mod table;

pub use cell::{Cell, ColumnKind};
pub use split::{generate_split, SplitPair, SplitSizes, PSB2_DATASETS};
pub use table::{Column, DatasetSplit, RawTable, Row};
