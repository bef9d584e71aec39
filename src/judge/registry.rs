use crate::config::types::{Result, SynthError};
use crate::judge::adapter::CandidateAdapter;
use crate::judge::languages::python::PythonAdapter;

pub fn adapter_for(language: &str) -> Result<Box<dyn CandidateAdapter>> {
    match language {
        "python" | "py" | "python3" => Ok(Box::new(PythonAdapter)),
        _ => Err(SynthError::Config(format!(
            "unsupported candidate language: {language}"
        ))),
    }
}
