use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use crate::error::{Error, FinalizerFailure, ProcessFailure};
use crate::invocation::Invocation;

/// A step run exactly once after the process exits, receiving its exit status.
///
/// The finalizer runs whether or not the process succeeded, so cleanup and fixups always happen;
/// it should check the status itself if it only applies to successful runs.
pub type Finalizer = Box<dyn FnOnce(ExitStatus) -> anyhow::Result<()> + Send>;

/// Where the child's standard output goes. Standard error is always captured.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Stdout {
    /// Send the child's stdout to our stderr, keeping our own stdout free for parseable output.
    #[default]
    Stderr,
    /// Discard the child's stdout.
    Null,
    /// Capture the child's stdout; see [`Job::output`].
    Capture,
}

/// A running subprocess.
///
/// The job exclusively owns the process handle. Dropping a job does not kill the process.
pub struct Job {
    command: String,
    child: Child,
    finalizer: Option<Finalizer>,
}

/// The outcome of a process that ran to completion.
#[derive(Debug)]
pub struct ExitedJob {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl Job {
    /// Spawn the given invocation, with an optional finalizer to run once it exits.
    pub fn spawn(
        invocation: &Invocation,
        stdout: Stdout,
        finalizer: Option<Finalizer>,
    ) -> Result<Self, Error> {
        let command = invocation.render_command();
        debug!("Executing: {command}");
        trace!("Environment: {}", invocation.render_env());

        let stdout = match stdout {
            Stdout::Stderr => Stdio::from(io::stderr()),
            Stdout::Null => Stdio::null(),
            Stdout::Capture => Stdio::piped(),
        };
        let child = Command::new(invocation.program())
            .args(invocation.args())
            .env_clear()
            .envs(invocation.env())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| Error::Spawn(command.clone(), err))?;

        Ok(Self {
            command,
            child,
            finalizer,
        })
    }

    /// The literal command line issued, quoted for a POSIX shell.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The OS process ID, if the process hasn't been reaped yet.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the process and wait for it to exit.
    ///
    /// Only the direct child is killed. Processes it started keep running, and a subsequent wait
    /// still blocks until they close their end of the stderr pipe. The finalizer still runs when
    /// the job is subsequently waited on.
    pub async fn kill(&mut self) -> io::Result<()> {
        debug!("Killing `{}`", self.command);
        self.child.kill().await
    }

    /// Wait for the process to exit, without running the finalizer.
    ///
    /// Output is drained concurrently so the child can't block on a full pipe. Returns once the
    /// child has exited and its pipes reached EOF, so a background process inheriting them
    /// delays the return until it exits too.
    pub async fn wait_for_exit(&mut self) -> Result<ExitedJob, Error> {
        let stdout = self.child.stdout.take();
        let stderr = self.child.stderr.take();
        let (status, stdout, stderr) =
            tokio::try_join!(self.child.wait(), read_to_end(stdout), read_to_end(stderr))
                .map_err(|err| Error::Wait(self.command.clone(), err))?;
        debug!("`{}` exited with {status}", self.command);
        Ok(ExitedJob {
            status,
            stdout,
            stderr,
        })
    }

    /// The generic failure for a process that exited unsuccessfully.
    pub fn process_failure(&self, exited: &ExitedJob) -> Error {
        Error::Process(ProcessFailure {
            command: self.command.clone(),
            exit_status: exited.status,
            stderr: String::from_utf8_lossy(&exited.stderr)
                .lines()
                .map(ToString::to_string)
                .collect(),
        })
    }

    /// Run the finalizer, then settle the job's result.
    ///
    /// `failure` is the already-determined failure of the process, if any. A finalizer failure
    /// is reported as [`Error::Finalizer`] after a successful run; after a failed run, the
    /// process failure takes precedence and the finalizer failure is only logged.
    pub fn finish(mut self, status: ExitStatus, failure: Option<Error>) -> Result<(), Error> {
        let finalized = match self.finalizer.take() {
            Some(finalizer) => finalizer(status),
            None => Ok(()),
        };
        match (failure, finalized) {
            (None, Ok(())) => Ok(()),
            (None, Err(err)) => Err(Error::Finalizer(FinalizerFailure::new(
                self.command,
                status,
                err,
            ))),
            (Some(failure), Ok(())) => Err(failure),
            (Some(failure), Err(err)) => {
                warn!(
                    "Post-processing after `{}` also failed: {err:#}",
                    self.command
                );
                Err(failure)
            }
        }
    }

    /// Wait for the process to exit and run the finalizer.
    pub async fn wait(mut self) -> Result<(), Error> {
        let exited = self.wait_for_exit().await?;
        let failure = (!exited.status.success()).then(|| self.process_failure(&exited));
        self.finish(exited.status, failure)
    }

    /// Wait for the process to exit and run the finalizer, returning the captured stdout.
    ///
    /// Stdout is only captured for jobs spawned with [`Stdout::Capture`]; otherwise it's empty.
    pub async fn output(mut self) -> Result<Vec<u8>, Error> {
        let exited = self.wait_for_exit().await?;
        let failure = (!exited.status.success()).then(|| self.process_failure(&exited));
        self.finish(exited.status, failure)?;
        Ok(exited.stdout)
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("command", &self.command)
            .field("pid", &self.child.id())
            .field("finalizer", &self.finalizer.is_some())
            .finish()
    }
}

async fn read_to_end(reader: Option<impl AsyncRead + Unpin>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}
