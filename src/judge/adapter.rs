use std::path::Path;

/// Adapter contract for starting a candidate worker in a given language.
pub trait CandidateAdapter: Send + Sync {
    fn language(&self) -> &'static str;

    /// Argv for a worker that speaks the request/reply protocol on stdin/stdout.
    fn worker_command(&self, runtime: &Path) -> Vec<String>;

    /// Complete worker environment; nothing is inherited from the supervisor.
    fn worker_environment(&self) -> Vec<(String, String)>;

    /// Argv that prints a JSON object `{"version": .., "modules": {name: bool}}`
    /// describing the runtime and which of `modules` it can import.
    fn probe_command(&self, runtime: &Path, modules: &[String]) -> Vec<String>;
}
