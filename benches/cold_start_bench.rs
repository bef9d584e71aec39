// Cold-start benchmark for candidate evaluation
// Measures end-to-end latency of one evaluate() call: worker spawn, harness
// start, module preload, row execution, teardown.

use std::time::{Duration, Instant};
use synthbox::dataset::DatasetSplit;
use synthbox::{Evaluator, EvaluatorConfig};

const ITERATIONS: usize = 30;
const WARMUP_ITERATIONS: usize = 3;

struct LatencyStats {
    p50: Duration,
    p95: Duration,
    min: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();
        let sum: Duration = samples.iter().sum();

        Self {
            p50: samples[len / 2],
            p95: samples[((len as f64 * 0.95) as usize).min(len - 1)],
            min: samples[0],
            max: samples[len - 1],
            mean: sum / len as u32,
        }
    }

    fn print(&self) {
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  min: {:?}", self.min);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

struct Scenario {
    name: &'static str,
    source: &'static str,
    split: DatasetSplit,
    timeout: Duration,
    p50_budget: Duration,
}

fn rows_csv(rows: usize) -> String {
    let mut csv = String::from("input1,output1\n");
    for i in 0..rows {
        csv.push_str(&format!("{},{}\n", i, i + 1));
    }
    csv
}

fn split(rows: usize) -> DatasetSplit {
    DatasetSplit::from_reader(rows_csv(rows).as_bytes(), "input").expect("benchmark split")
}

fn run(evaluator: &Evaluator, scenario: &Scenario) -> bool {
    for _ in 0..WARMUP_ITERATIONS {
        let _ = evaluator.evaluate_with_timeout(scenario.source, &scenario.split, scenario.timeout);
    }

    let mut samples = Vec::with_capacity(ITERATIONS);
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        let _ = evaluator.evaluate_with_timeout(scenario.source, &scenario.split, scenario.timeout);
        samples.push(start.elapsed());
    }

    let stats = LatencyStats::from_samples(samples);
    println!("\n=== {} ===", scenario.name);
    stats.print();
    let passed = stats.p50 < scenario.p50_budget;
    if passed {
        println!("✅ PASS");
    } else {
        println!("❌ FAIL: p50={:?} (target <{:?})", stats.p50, scenario.p50_budget);
    }
    passed
}

fn main() {
    println!("=== synthbox Evaluation Cold-Start Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let config = EvaluatorConfig::default();
    if !config.runtime_path.exists() {
        println!("{} not found; skipping", config.runtime_path.display());
        return;
    }
    let evaluator = Evaluator::new(config).expect("default config is valid");

    let scenarios = [
        Scenario {
            name: "4-row split",
            source: "def my_func(x):\n    return x + 1\n",
            split: split(4),
            timeout: Duration::from_secs(10),
            p50_budget: Duration::from_millis(500),
        },
        Scenario {
            name: "2000-row split",
            source: "def my_func(x):\n    return x + 1\n",
            split: split(2000),
            timeout: Duration::from_secs(10),
            p50_budget: Duration::from_millis(800),
        },
        Scenario {
            name: "Timeout teardown (250ms budget)",
            source: "def my_func(x):\n    while True:\n        pass\n",
            split: split(4),
            timeout: Duration::from_millis(250),
            p50_budget: Duration::from_millis(400),
        },
    ];

    let passed = scenarios.iter().filter(|s| run(&evaluator, s)).count();
    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed, scenarios.len());
    if passed != scenarios.len() {
        std::process::exit(1);
    }
}
