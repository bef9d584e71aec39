//! PSB2 train/test split generation.
//!
//! Each task ships an edge-case file and a random-case file. Training takes
//! every edge case and tops up from the random pool; testing draws only from
//! the random pool.

use crate::config::types::{Result, SynthError};
use crate::dataset::table::RawTable;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

pub const PSB2_DATASETS: &[&str] = &[
    "basement",
    "bouncing-balls",
    "bowling",
    "camel-case",
    "coin-sums",
    "cut-vector",
    "dice-game",
    "find-pair",
    "fizz-buzz",
    "fuel-cost",
    "gcd",
    "indices-of-substring",
    "leaders",
    "luhn",
    "mastermind",
    "middle-character",
    "paired-digits",
    "shopping-list",
    "snow-day",
    "solve-boolean",
    "spin-words",
    "square-digits",
    "substitution-cipher",
    "twitter",
    "vector-distance",
];

/// Target split sizes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitSizes {
    pub train: usize,
    pub test: usize,
}

impl Default for SplitSizes {
    fn default() -> Self {
        Self {
            train: 200,
            test: 2000,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SplitPair {
    pub train: RawTable,
    pub test: RawTable,
}

fn sample_records(pool: &RawTable, amount: usize, seed: u64) -> Result<Vec<Vec<String>>> {
    if amount > pool.len() {
        return Err(SynthError::Dataset(format!(
            "cannot sample {} cases from a pool of {}",
            amount,
            pool.len()
        )));
    }
    // Every draw starts from a fresh generator with the run seed, so a run is
    // reproducible from its seed alone.
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(rand::seq::index::sample(&mut rng, pool.len(), amount)
        .into_iter()
        .map(|i| pool.records[i].clone())
        .collect())
}

/// Build the train/test pair for one run.
pub fn generate_split(
    edge: &RawTable,
    random: &RawTable,
    sizes: SplitSizes,
    seed: u64,
) -> Result<SplitPair> {
    if edge.headers != random.headers {
        return Err(SynthError::Dataset(format!(
            "edge and random headers differ: {:?} vs {:?}",
            edge.headers, random.headers
        )));
    }
    if edge.len() > sizes.train {
        return Err(SynthError::Dataset(format!(
            "{} edge cases exceed the training size {}",
            edge.len(),
            sizes.train
        )));
    }

    let mut train_records = edge.records.clone();
    train_records.extend(sample_records(random, sizes.train - edge.len(), seed)?);

    let test_records = sample_records(random, sizes.test, seed)?;

    Ok(SplitPair {
        train: RawTable {
            headers: edge.headers.clone(),
            records: train_records,
        },
        test: RawTable {
            headers: random.headers.clone(),
            records: test_records,
        },
    })
}

/// Read `{data_dir}/{task}/{task}-edge.csv` and `{task}-random.csv`.
pub fn load_task_tables(data_dir: &Path, task: &str) -> Result<(RawTable, RawTable)> {
    let task_dir = data_dir.join(task);
    let edge = RawTable::from_path(task_dir.join(format!("{}-edge.csv", task)))?;
    let random = RawTable::from_path(task_dir.join(format!("{}-random.csv", task)))?;
    Ok((edge, random))
}

/// Paths a split pair is stored under: `{root}/{task}/{task}_{portion}_{train,test}.csv`.
pub fn split_paths(root: &Path, task: &str, portion: &str) -> (PathBuf, PathBuf) {
    let task_dir = root.join(task);
    (
        task_dir.join(format!("{}_{}_train.csv", task, portion)),
        task_dir.join(format!("{}_{}_test.csv", task, portion)),
    )
}

pub fn write_split(root: &Path, task: &str, portion: &str, pair: &SplitPair) -> Result<(PathBuf, PathBuf)> {
    let (train_path, test_path) = split_paths(root, task, portion);
    pair.train.write_to_path(&train_path)?;
    pair.test.write_to_path(&test_path)?;
    log::info!(
        "wrote {} split for {}: {} train / {} test",
        portion,
        task,
        pair.train.len(),
        pair.test.len()
    );
    Ok((train_path, test_path))
}
