//! External process execution for analyzers.
//!
//! Every analyzer is an external tool invoked through a shell in a project's
//! root directory. This crate owns launching, output capture, timeouts, and
//! process-group cleanup.

mod env;
mod process;
mod runner;
mod shell;

pub use env::{ENV_SECRET_DENYLIST, default_denylist, is_denied};
pub use runner::{ProcessOutput, ProcessRunner, RunError, RunnerSettings};
pub use shell::{Shell, ShellConfig};
