//! Language-agnostic worker runtime.
//!
//! One process per evaluation: spawned into its own process group (and, where
//! the kernel allows, as init of its own PID namespace) with kernel limits and
//! a syscall filter, fed a single request, watched against a wall-clock
//! budget, and killed as a group when done.

pub mod preexec;
pub mod seccomp;
pub mod supervisor;
pub mod types;
