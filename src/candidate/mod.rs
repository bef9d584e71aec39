//! Candidate source
//!
//! Turns raw LLM completions into candidate programs. The evaluator treats the
//! result as opaque text; nothing here vouches for its safety.

pub mod responses;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const CODE_FENCE: &str = "```";
const PYTHON_FENCE: &str = "```python";

/// Program text plus the entry-point name it is expected to bind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProgram {
    pub source: String,
    pub entry_point: String,
}

impl CandidateProgram {
    pub fn new(source: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            entry_point: entry_point.into(),
        }
    }

    /// SHA-256 of the source, hex encoded. Used to correlate log lines.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// First 12 hex digits of [`Self::digest`].
    pub fn short_digest(&self) -> String {
        self.digest()[..12].to_string()
    }
}

/// Pull the program out of a completion.
///
/// Takes the text after a ```` ```python ```` fence (or the whole completion
/// when there is none) up to the next fence. Returns `None` unless the code
/// contains a `def ` and mentions the entry point.
pub fn extract_program(response: &str, entry_point: &str) -> Option<CandidateProgram> {
    let script = match response.find(PYTHON_FENCE) {
        Some(start) => &response[start + PYTHON_FENCE.len()..],
        None => response,
    };
    let code = script.split(CODE_FENCE).next().unwrap_or_default();

    if code.contains("def ") && code.contains(entry_point) {
        Some(CandidateProgram::new(code.trim_matches('\n'), entry_point))
    } else {
        None
    }
}

/// Keep only word characters and whitespace, then trim.
pub fn sanitize_input(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}
