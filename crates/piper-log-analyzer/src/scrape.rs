use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use piper_job::{AnalyzedFailure, Error, Job};
use piper_tailer::{LineFilter, TailSink, Tailer};

use crate::analyzer::{ErrorAnalyzer, ErrorMessage};

/// The log file a scraped process writes to.
///
/// The log lives in a fresh temporary directory which is removed when the log is dropped,
/// unless the log was created to be preserved.
#[derive(Debug)]
pub struct ScrapeLog {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl ScrapeLog {
    pub fn create(preserve: bool) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("piper-pip-log.")
            .tempdir()?;
        let path = dir.path().join("pip.log");
        if preserve {
            let dir = dir.keep();
            debug!("Preserving pip log in {}", dir.display());
            Ok(Self { path, dir: None })
        } else {
            Ok(Self {
                path,
                dir: Some(dir),
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_preserved(&self) -> bool {
        self.dir.is_none()
    }
}

/// Log lines to pass on as they're written, e.g., progress messages worth showing a user.
pub struct Forward {
    filter: LineFilter,
    sink: Box<dyn TailSink>,
}

impl Forward {
    pub fn new(filter: LineFilter, sink: impl TailSink) -> Self {
        Self {
            filter,
            sink: Box::new(sink),
        }
    }
}

impl std::fmt::Debug for Forward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forward")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

/// Feeds every log line to the analyzers that are still active, and to the forward, if any.
struct ScrapeSink {
    /// Analyzers are replaced with `None` once complete.
    analyzers: Vec<Option<Box<dyn ErrorAnalyzer>>>,
    messages: Vec<ErrorMessage>,
    forward: Option<Forward>,
}

impl TailSink for ScrapeSink {
    fn line(&mut self, line: &str) {
        for slot in &mut self.analyzers {
            let Some(analyzer) = slot else {
                continue;
            };
            let analysis = analyzer.analyze(line);
            if analysis.is_complete() {
                *slot = None;
            }
            self.messages.extend(analysis.into_message());
        }
        if let Some(Forward { filter, sink }) = &mut self.forward {
            if let Some(line) = filter.apply(line) {
                sink.line(line);
            }
        }
    }
}

/// A [`Job`] whose log is analyzed while it runs to explain failures.
///
/// The process must be told to write its log to [`ScrapeLog::path`].
#[derive(Debug)]
pub struct LogScrapeJob {
    job: Job,
    log: ScrapeLog,
    tailer: Tailer<ScrapeSink>,
}

impl std::fmt::Debug for ScrapeSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeSink")
            .field("messages", &self.messages)
            .finish_non_exhaustive()
    }
}

impl LogScrapeJob {
    /// Start analyzing the log of an already spawned job. Must be called within a Tokio runtime.
    ///
    /// At least one analyzer is required; a job without any has nothing to scrape and should be
    /// waited on directly.
    pub fn start(
        job: Job,
        log: ScrapeLog,
        analyzers: impl IntoIterator<Item = Box<dyn ErrorAnalyzer>>,
        forward: Option<Forward>,
    ) -> Self {
        let analyzers = analyzers.into_iter().map(Some).collect::<Vec<_>>();
        debug_assert!(
            !analyzers.is_empty(),
            "A log scrape job requires at least one analyzer"
        );
        let sink = ScrapeSink {
            analyzers,
            messages: Vec::new(),
            forward,
        };
        let tailer = Tailer::tail(log.path(), LineFilter::all(), sink);
        Self { job, log, tailer }
    }

    pub fn command(&self) -> &str {
        self.job.command()
    }

    pub fn log(&self) -> &ScrapeLog {
        &self.log
    }

    /// Kill the process; see [`Job::kill`].
    pub async fn kill(&mut self) -> io::Result<()> {
        self.job.kill().await
    }

    /// Wait for the process to exit and settle its result from the exit status and the log.
    ///
    /// The log is fully drained before the result is decided. A failed process with analyzer
    /// messages yields [`Error::Analyzed`]; one without yields the generic process failure.
    /// The job's finalizer runs last.
    pub async fn wait(self) -> Result<(), Error> {
        let Self {
            mut job,
            log,
            mut tailer,
        } = self;

        let exited = job.wait_for_exit().await;
        let messages = tailer
            .stop()
            .await
            .map(|sink| sink.messages)
            .unwrap_or_default();
        let exited = exited?;

        let failure = if exited.status.success() {
            for message in &messages {
                debug!("Ignoring log message of successful `{}`: {message}", job.command());
            }
            None
        } else if messages.is_empty() {
            Some(job.process_failure(&exited))
        } else {
            Some(Error::Analyzed(AnalyzedFailure::new(
                job.command().to_string(),
                exited.status,
                messages.into_iter().map(ErrorMessage::into_string).collect(),
            )))
        };

        let result = job.finish(exited.status, failure);
        drop(log);
        result
    }
}
