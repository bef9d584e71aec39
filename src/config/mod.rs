//! Configuration
//!
//! Evaluator settings, file overrides, and startup validation.

pub mod loader;
pub mod types;
pub mod validator;
