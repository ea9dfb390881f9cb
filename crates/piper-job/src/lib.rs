//! Supervise a single subprocess: spawn it, wait for it, and run an optional finalizer exactly
//! once after it exits.

pub use error::{AnalyzedFailure, Error, FinalizerFailure, ProcessFailure};
pub use invocation::{Invocation, shlex_quote};
pub use job::{ExitedJob, Finalizer, Job, Stdout};

mod error;
mod invocation;
mod job;
