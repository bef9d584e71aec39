use crate::batch::{run_posthoc, PosthocPlan};
use crate::candidate::extract_program;
use crate::config::loader::load_config;
use crate::config::types::EvaluatorConfig;
use crate::dataset::split::{load_task_tables, write_split};
use crate::dataset::{generate_split, DatasetSplit, SplitSizes, PSB2_DATASETS};
use crate::evaluator::Evaluator;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON config file (defaults to ./synthbox.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Append structured audit events to this file
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one candidate program against a dataset split
    Evaluate {
        /// Candidate source file
        #[arg(long)]
        program: PathBuf,
        /// Dataset split CSV
        #[arg(long)]
        data: PathBuf,
        /// Wall-clock timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,
        /// Treat the program file as a raw model response and extract the code
        #[arg(long)]
        from_response: bool,
        /// Refuse to run when a sandbox control cannot be applied
        #[arg(long)]
        strict: bool,
    },
    /// Generate PSB2 train/test splits from edge and random case files
    Split {
        /// Directory holding `{task}/{task}-edge.csv` and `{task}-random.csv`
        #[arg(long)]
        data_dir: PathBuf,
        /// Tasks to split (all PSB2 tasks when omitted)
        #[arg(long = "task", alias = "tasks")]
        tasks: Vec<String>,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Output root; splits land in `{out}/{task}/`
        #[arg(long)]
        out: PathBuf,
        /// Split label used in file names
        #[arg(long, default_value = "200")]
        portion: String,
        #[arg(long, default_value_t = 200)]
        train_size: usize,
        #[arg(long, default_value_t = 2000)]
        test_size: usize,
    },
    /// Replay logged responses through the evaluator and count solved tasks
    Posthoc {
        /// Dataset root holding splits and response logs
        #[arg(long)]
        datasets: PathBuf,
        #[arg(long, default_value = "200")]
        portion: String,
        #[arg(long, default_value_t = 100)]
        iterations: usize,
        /// Tasks to score (all PSB2 tasks when omitted)
        #[arg(long = "task", alias = "tasks")]
        tasks: Vec<String>,
        /// Wall-clock timeout per split in seconds
        #[arg(long)]
        timeout: Option<f64>,
        /// Score train and test splits concurrently
        #[arg(long)]
        parallel: bool,
    },
    /// Check that the worker runtime and its numeric modules are installed
    CheckDeps {
        /// Print the runtime version and per-module status
        #[arg(long)]
        verbose: bool,
    },
}

fn tasks_or_all(tasks: Vec<String>) -> Vec<String> {
    if tasks.is_empty() {
        PSB2_DATASETS.iter().map(|t| t.to_string()).collect()
    } else {
        tasks
    }
}

fn apply_timeout(config: &mut EvaluatorConfig, timeout: Option<f64>) -> Result<()> {
    if let Some(secs) = timeout {
        config.timeout = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid timeout: {}", secs))?;
    }
    Ok(())
}

pub fn run() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Some(path) = &cli.audit_log {
        crate::observability::audit::init_audit_logger(Some(path.clone()))?;
    }
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Evaluate {
            program,
            data,
            timeout,
            from_response,
            strict,
        } => {
            apply_timeout(&mut config, timeout)?;
            config.strict_mode |= strict;

            let text = std::fs::read_to_string(&program)
                .with_context(|| format!("reading {}", program.display()))?;
            let source = if from_response {
                extract_program(&text, &config.entry_point)
                    .map(|p| p.source)
                    .with_context(|| {
                        format!("no `{}` definition found in {}", config.entry_point, program.display())
                    })?
            } else {
                text
            };
            let split = DatasetSplit::from_path(&data, &config.input_marker)?;

            let evaluator = Evaluator::new(config)?;
            let evaluation = evaluator.evaluate(&source, &split)?;
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
            Ok(())
        }
        Commands::Split {
            data_dir,
            tasks,
            seed,
            out,
            portion,
            train_size,
            test_size,
        } => {
            let sizes = SplitSizes {
                train: train_size,
                test: test_size,
            };
            for task in tasks_or_all(tasks) {
                let (edge, random) = load_task_tables(&data_dir, &task)
                    .with_context(|| format!("loading case files for {}", task))?;
                let pair = generate_split(&edge, &random, sizes, seed)
                    .with_context(|| format!("splitting {}", task))?;
                let (train, test) = write_split(&out, &task, &portion, &pair)?;
                println!("{}: {} {}", task, train.display(), test.display());
            }
            Ok(())
        }
        Commands::Posthoc {
            datasets,
            portion,
            iterations,
            tasks,
            timeout,
            parallel,
        } => {
            apply_timeout(&mut config, timeout)?;
            let evaluator = Evaluator::new(config)?;
            let plan = PosthocPlan {
                root: datasets,
                portion,
                iterations,
                tasks: tasks_or_all(tasks),
                parallel_splits: parallel,
            };
            let summaries = run_posthoc(&evaluator, &plan)?;
            for summary in &summaries {
                println!(
                    "{:<22} train {:>3}  test {:>3}  both {:>3}  skipped {:>3}",
                    summary.task,
                    summary.train_solved,
                    summary.test_solved,
                    summary.both_solved,
                    summary.skipped
                );
            }
            println!("summary written to {}", plan.summary_path().display());
            Ok(())
        }
        Commands::CheckDeps { verbose } => check_runtime(config, verbose),
    }
}

fn check_runtime(config: EvaluatorConfig, verbose: bool) -> Result<()> {
    println!("Checking candidate runtime...");
    let runtime = config.runtime_path.clone();
    let evaluator = Evaluator::new(config)?;

    let report = match evaluator.check_runtime() {
        Ok(report) => report,
        Err(e) => {
            println!("❌ {} - {}", runtime.display(), e);
            anyhow::bail!("candidate runtime unavailable");
        }
    };
    println!("✅ {} - OK", runtime.display());
    if verbose {
        println!("  version -> {}", report.version);
    }

    let missing: Vec<&String> = report
        .modules
        .iter()
        .filter(|(_, present)| !**present)
        .map(|(name, _)| name)
        .collect();
    if verbose {
        for (name, present) in &report.modules {
            println!("  {} -> {}", name, if *present { "OK" } else { "MISSING" });
        }
    }
    if missing.is_empty() {
        println!("All allowed modules are importable.");
    } else {
        // Missing modules are not fatal: candidates that import them fail
        // their own evaluation.
        println!("⚠️  Missing allowed modules: {:?}", missing);
    }
    Ok(())
}
