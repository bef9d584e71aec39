//! JSON-lines response logs written by the candidate source.
//!
//! One record per line: the question asked, the context sent with it, and the
//! raw completion. The last record in an iteration file is that iteration's
//! candidate.

use crate::config::types::{Result, SynthError};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub question: String,
    #[serde(default)]
    pub context: String,
    pub response: String,
}

/// Read every record; blank lines are skipped, malformed lines are errors.
pub fn read_records(path: &Path) -> Result<Vec<ResponseRecord>> {
    let file = std::fs::File::open(path).map_err(|e| {
        SynthError::Candidate(format!("failed to open {}: {}", path.display(), e))
    })?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            SynthError::Candidate(format!("{}:{}: {}", path.display(), index + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Last record of the file, if any.
pub fn last_record(path: &Path) -> Result<Option<ResponseRecord>> {
    Ok(read_records(path)?.pop())
}

pub fn append_record(path: &Path, record: &ResponseRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let line = serde_json::to_string(record)
        .map_err(|e| SynthError::Candidate(format!("failed to encode record: {}", e)))?;
    writeln!(file, "{}", line)?;
    log::debug!("response logged to {}", path.display());
    Ok(())
}

/// `{root}/{task}/{portion}/responses/{task}_{iteration}_test_responses.json`,
/// iterations counted from 1.
pub fn iteration_log_path(root: &Path, task: &str, portion: &str, iteration: usize) -> PathBuf {
    root.join(task)
        .join(portion)
        .join("responses")
        .join(format!("{}_{}_test_responses.json", task, iteration))
}
