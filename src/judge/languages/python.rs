use crate::judge::adapter::CandidateAdapter;
use std::path::Path;

/// Worker program run with `python3 -c`. Reads the JSON request from stdin,
/// execs the candidate under a restricted import hook, and writes one reply.
const HARNESS: &str = include_str!("../harness.py");

const PROBE: &str = r#"
import importlib.util, json, sys
print(json.dumps({
    "version": sys.version.split()[0],
    "modules": {m: importlib.util.find_spec(m) is not None for m in sys.argv[1:]},
}))
"#;

#[derive(Debug, Clone, Default)]
pub struct PythonAdapter;

impl CandidateAdapter for PythonAdapter {
    fn language(&self) -> &'static str {
        "python"
    }

    fn worker_command(&self, runtime: &Path) -> Vec<String> {
        // -B: no .pyc writes (RLIMIT_FSIZE is 0). -s: no user site dir.
        // Not -I, which would also drop PYTHONHASHSEED.
        vec![
            runtime.to_string_lossy().to_string(),
            "-B".to_string(),
            "-s".to_string(),
            "-c".to_string(),
            HARNESS.to_string(),
        ]
    }

    fn worker_environment(&self) -> Vec<(String, String)> {
        [
            ("PATH", "/usr/local/bin:/usr/bin:/bin"),
            ("LANG", "C.UTF-8"),
            ("PYTHONHASHSEED", "0"),
            ("PYTHONIOENCODING", "utf-8"),
            ("PYTHONDONTWRITEBYTECODE", "1"),
            // One BLAS thread keeps numpy within the address-space limit.
            ("OPENBLAS_NUM_THREADS", "1"),
            ("OMP_NUM_THREADS", "1"),
            ("MKL_NUM_THREADS", "1"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn probe_command(&self, runtime: &Path, modules: &[String]) -> Vec<String> {
        let mut argv = vec![
            runtime.to_string_lossy().to_string(),
            "-c".to_string(),
            PROBE.to_string(),
        ];
        argv.extend(modules.iter().cloned());
        argv
    }
}
