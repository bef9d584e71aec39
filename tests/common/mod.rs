//! Shared helpers for integration tests that need a real Python worker.

use synthbox::dataset::DatasetSplit;
use synthbox::{EvaluatorConfig, Evaluator};
use std::path::Path;
use std::process::Command;

/// True when the default worker runtime can be started. Tests that need it
/// return early otherwise.
pub fn python_available() -> bool {
    let runtime = EvaluatorConfig::default().runtime_path;
    Path::new(&runtime).exists()
        && Command::new(&runtime)
            .arg("-c")
            .arg("pass")
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
}

pub fn evaluator() -> Evaluator {
    Evaluator::new(EvaluatorConfig::default()).unwrap()
}

#[allow(dead_code)]
pub fn split(csv: &str) -> DatasetSplit {
    DatasetSplit::from_reader(csv.as_bytes(), "input").unwrap()
}

#[allow(dead_code)]
pub fn process_gone(pid: i32) -> bool {
    !Path::new(&format!("/proc/{}", pid)).exists()
}

/// True when some process whose command line contains `marker` is still
/// alive two seconds from now.
#[allow(dead_code)]
pub fn cmdline_survives(marker: &str) -> bool {
    let present = || {
        std::fs::read_dir("/proc")
            .map(|entries| {
                entries.flatten().any(|entry| {
                    std::fs::read(entry.path().join("cmdline"))
                        .map(|cmdline| String::from_utf8_lossy(&cmdline).contains(marker))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    };
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    while present() {
        if std::time::Instant::now() > deadline {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    false
}
