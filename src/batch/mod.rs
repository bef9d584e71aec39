//! Post-hoc batch scoring.
//!
//! Replays logged responses through the evaluator: for every task and
//! iteration, the last response in the iteration log is scored on the task's
//! train and test splits. A split counts as solved only at score 1.0.

use crate::candidate::extract_program;
use crate::candidate::responses::{iteration_log_path, last_record};
use crate::config::types::{Result, SynthError};
use crate::dataset::split::split_paths;
use crate::dataset::DatasetSplit;
use crate::evaluator::Evaluator;
use crate::observability::audit::events;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct PosthocPlan {
    /// Dataset root holding `{task}/` directories.
    pub root: PathBuf,
    /// Split label, e.g. `200`.
    pub portion: String,
    /// Iterations per task, counted from 1.
    pub iterations: usize,
    pub tasks: Vec<String>,
    /// Score train and test concurrently.
    pub parallel_splits: bool,
}

impl PosthocPlan {
    pub fn task_results_path(&self, task: &str) -> PathBuf {
        self.root
            .join(task)
            .join(format!("{}_{}_per_dict.csv", task, self.portion))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join(format!("posthoc_{}_summary.csv", self.portion))
    }
}

/// Scores of one iteration's candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationOutcome {
    pub iteration: usize,
    pub train_score: f64,
    pub test_score: f64,
}

impl IterationOutcome {
    pub fn train_solved(&self) -> bool {
        self.train_score == 1.0
    }

    pub fn test_solved(&self) -> bool {
        self.test_score == 1.0
    }

    pub fn both_solved(&self) -> bool {
        self.train_solved() && self.test_solved()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task: String,
    pub train_solved: usize,
    pub test_solved: usize,
    pub both_solved: usize,
    /// Iterations that produced scores.
    pub scored: usize,
    /// Iterations with no usable log or a failed evaluation.
    pub skipped: usize,
}

impl TaskSummary {
    fn tally(task: &str, outcomes: &[IterationOutcome], skipped: usize) -> Self {
        Self {
            task: task.to_string(),
            train_solved: outcomes.iter().filter(|o| o.train_solved()).count(),
            test_solved: outcomes.iter().filter(|o| o.test_solved()).count(),
            both_solved: outcomes.iter().filter(|o| o.both_solved()).count(),
            scored: outcomes.len(),
            skipped,
        }
    }
}

struct TaskSplits {
    train: DatasetSplit,
    test: DatasetSplit,
}

fn load_splits(evaluator: &Evaluator, plan: &PosthocPlan, task: &str) -> Result<TaskSplits> {
    let (train_path, test_path) = split_paths(&plan.root, task, &plan.portion);
    let marker = evaluator.config().input_marker.as_str();
    Ok(TaskSplits {
        train: DatasetSplit::from_path(&train_path, marker)?,
        test: DatasetSplit::from_path(&test_path, marker)?,
    })
}

fn score_pair(
    evaluator: &Evaluator,
    source: &str,
    splits: &TaskSplits,
    parallel: bool,
) -> Result<(f64, f64)> {
    if parallel {
        std::thread::scope(|scope| -> Result<(f64, f64)> {
            let train = scope.spawn(|| evaluator.evaluate(source, &splits.train));
            let test = evaluator.evaluate(source, &splits.test);
            let train = train
                .join()
                .map_err(|_| SynthError::Process("train evaluation thread panicked".to_string()))?;
            Ok((train?.score, test?.score))
        })
    } else {
        let train = evaluator.evaluate(source, &splits.train)?;
        let test = evaluator.evaluate(source, &splits.test)?;
        Ok((train.score, test.score))
    }
}

fn run_iteration(
    evaluator: &Evaluator,
    plan: &PosthocPlan,
    task: &str,
    iteration: usize,
    splits: &TaskSplits,
) -> Option<IterationOutcome> {
    let log_path = iteration_log_path(&plan.root, task, &plan.portion, iteration);
    let record = match last_record(&log_path) {
        Ok(Some(record)) => record,
        Ok(None) => {
            log::warn!("{} iteration {}: empty log {}", task, iteration, log_path.display());
            events::iteration_skipped(task, iteration, "empty response log");
            return None;
        }
        Err(e) => {
            log::warn!("{} iteration {}: {}", task, iteration, e);
            events::iteration_skipped(task, iteration, &e.to_string());
            return None;
        }
    };

    let entry_point = evaluator.config().entry_point.as_str();
    let Some(program) = extract_program(&record.response, entry_point) else {
        log::info!(
            "{} iteration {}: no program in response to {:?}",
            task,
            iteration,
            record.question
        );
        return Some(IterationOutcome {
            iteration,
            train_score: 0.0,
            test_score: 0.0,
        });
    };

    match score_pair(evaluator, &program.source, splits, plan.parallel_splits) {
        Ok((train_score, test_score)) => {
            log::info!(
                "{} iteration {} [{}]: train {} test {}",
                task,
                iteration,
                program.short_digest(),
                train_score,
                test_score
            );
            Some(IterationOutcome {
                iteration,
                train_score,
                test_score,
            })
        }
        Err(e) => {
            log::error!(
                "{} iteration {}: evaluation of response to {:?} failed: {}",
                task,
                iteration,
                record.question,
                e
            );
            events::iteration_failure(task, iteration, &e.to_string());
            None
        }
    }
}

/// Score every iteration of one task.
pub fn run_task(evaluator: &Evaluator, plan: &PosthocPlan, task: &str) -> Result<(Vec<IterationOutcome>, TaskSummary)> {
    let splits = load_splits(evaluator, plan, task)?;
    let outcomes: Vec<IterationOutcome> = (1..=plan.iterations)
        .filter_map(|iteration| run_iteration(evaluator, plan, task, iteration, &splits))
        .collect();
    let summary = TaskSummary::tally(task, &outcomes, plan.iterations - outcomes.len());
    log::info!(
        "{} complete: train {} test {} both {} ({} skipped)",
        task,
        summary.train_solved,
        summary.test_solved,
        summary.both_solved,
        summary.skipped
    );
    Ok((outcomes, summary))
}

pub fn write_task_results(path: &Path, outcomes: &[IterationOutcome]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for outcome in outcomes {
        writer.serialize(outcome)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary(path: &Path, summaries: &[TaskSummary]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for summary in summaries {
        writer.serialize(summary)?;
    }
    writer.flush()?;
    Ok(())
}

/// Run the whole plan, writing one results CSV per task and a summary CSV.
///
/// A task whose splits cannot be loaded is logged and left out of the summary.
pub fn run_posthoc(evaluator: &Evaluator, plan: &PosthocPlan) -> Result<Vec<TaskSummary>> {
    let mut summaries = Vec::with_capacity(plan.tasks.len());
    for task in &plan.tasks {
        match run_task(evaluator, plan, task) {
            Ok((outcomes, summary)) => {
                write_task_results(&plan.task_results_path(task), &outcomes)?;
                summaries.push(summary);
            }
            Err(e) => log::error!("{}: skipped: {}", task, e),
        }
    }
    write_summary(&plan.summary_path(), &summaries)?;
    Ok(summaries)
}
