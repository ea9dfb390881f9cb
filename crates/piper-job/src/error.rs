use std::fmt::{Display, Formatter};
use std::io;
use std::process::ExitStatus;

use owo_colors::OwoColorize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to spawn `{0}`")]
    Spawn(String, #[source] io::Error),
    #[error("Failed to wait for `{0}`")]
    Wait(String, #[source] io::Error),
    #[error(transparent)]
    Process(#[from] ProcessFailure),
    #[error(transparent)]
    Analyzed(#[from] AnalyzedFailure),
    #[error(transparent)]
    Finalizer(#[from] FinalizerFailure),
}

impl Error {
    /// The exit status of the process, if it ran to completion.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            Self::Spawn(..) | Self::Wait(..) => None,
            Self::Process(failure) => Some(failure.exit_status),
            Self::Analyzed(failure) => Some(failure.exit_status),
            Self::Finalizer(failure) => Some(failure.exit_status),
        }
    }
}

/// The process exited with a failing status, and nothing more specific is known.
#[derive(Debug, Error)]
pub struct ProcessFailure {
    pub(crate) command: String,
    pub(crate) exit_status: ExitStatus,
    pub(crate) stderr: Vec<String>,
}

impl ProcessFailure {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn exit_status(&self) -> ExitStatus {
        self.exit_status
    }

    pub fn stderr(&self) -> &[String] {
        &self.stderr
    }
}

impl Display for ProcessFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executing `{}` failed ({})",
            self.command.cyan(),
            self.exit_status
        )?;

        if self.stderr.iter().any(|line| !line.trim().is_empty()) {
            write!(f, "\n\n{}\n{}", "[stderr]".red(), self.stderr.join("\n"))?;
        }

        Ok(())
    }
}

/// The process exited with a failing status, and its log explained why.
///
/// Preferred over [`ProcessFailure`] whenever a log analyzer captured anything.
#[derive(Debug, Error)]
pub struct AnalyzedFailure {
    command: String,
    exit_status: ExitStatus,
    messages: Vec<String>,
}

impl AnalyzedFailure {
    pub fn new(command: String, exit_status: ExitStatus, messages: Vec<String>) -> Self {
        Self {
            command,
            exit_status,
            messages,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn exit_status(&self) -> ExitStatus {
        self.exit_status
    }

    /// The captured messages, in the order they were emitted.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl Display for AnalyzedFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executing `{}` failed ({}):\n{}",
            self.command.cyan(),
            self.exit_status,
            self.messages.join("\n")
        )
    }
}

/// The process succeeded, but the step run after it exited failed.
#[derive(Debug, Error)]
#[error("Post-processing after `{}` failed", command.cyan())]
pub struct FinalizerFailure {
    command: String,
    exit_status: ExitStatus,
    #[source]
    source: anyhow::Error,
}

impl FinalizerFailure {
    pub(crate) fn new(command: String, exit_status: ExitStatus, source: anyhow::Error) -> Self {
        Self {
            command,
            exit_status,
            source,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}
