use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::filter::LineFilter;
use crate::reader::LineReader;
use crate::sink::TailSink;

/// How often a quiet (or missing) file is checked for new content.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Streams the lines appended to a file into a [`TailSink`] from a background task.
///
/// The file does not need to exist yet. Tailing runs until [`Tailer::stop`] is called, which
/// reads the file one final time, passes on any unterminated trailing line, and hands the sink
/// back.
#[derive(Debug)]
pub struct Tailer<S> {
    path: PathBuf,
    cancel: CancellationToken,
    handle: Option<JoinHandle<S>>,
}

impl<S: TailSink> Tailer<S> {
    /// Start tailing `path`. Must be called within a Tokio runtime.
    pub fn tail(path: impl Into<PathBuf>, filter: LineFilter, sink: S) -> Self {
        Self::with_poll_interval(path, filter, sink, POLL_INTERVAL)
    }

    pub fn with_poll_interval(
        path: impl Into<PathBuf>,
        filter: LineFilter,
        sink: S,
        interval: Duration,
    ) -> Self {
        let path = path.into();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(tail(
            path.clone(),
            filter,
            sink,
            cancel.clone(),
            interval,
        ));
        Self {
            path,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop tailing, draining what's left of the file.
    ///
    /// Returns the sink on the first call; later calls return `None`.
    pub async fn stop(&mut self) -> Option<S> {
        self.cancel.cancel();
        let handle = self.handle.take()?;
        match handle.await {
            Ok(sink) => Some(sink),
            Err(err) => {
                warn!("Tailing `{}` did not complete: {err}", self.path.display());
                None
            }
        }
    }
}

impl<S> Drop for Tailer<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[tracing::instrument(name = "tail", skip_all, fields(path = %path.display()))]
async fn tail<S: TailSink>(
    path: PathBuf,
    filter: LineFilter,
    mut sink: S,
    cancel: CancellationToken,
    interval: Duration,
) -> S {
    let Some(file) = open(&path, &cancel, interval).await else {
        return sink;
    };
    debug!("Tailing {}", path.display());

    let mut forward = |line: &str| {
        if let Some(line) = filter.apply(line) {
            sink.line(line);
        }
    };

    let mut reader = LineReader::new(file);
    loop {
        // Observe cancellation before reading, so that the read after it is the final drain.
        let stopping = cancel.is_cancelled();
        if let Err(err) = reader.read_lines(&mut forward).await {
            debug!("Stopped tailing {}: {err}", path.display());
            break;
        }
        if stopping {
            reader.flush(&mut forward);
            break;
        }
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(interval) => {}
        }
    }

    sink
}

/// Wait for `path` to exist, giving up once cancelled (after one last attempt).
async fn open(
    path: &Path,
    cancel: &CancellationToken,
    interval: Duration,
) -> Option<fs_err::tokio::File> {
    loop {
        let stopping = cancel.is_cancelled();
        match fs_err::tokio::File::open(path).await {
            Ok(file) => return Some(file),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if stopping {
                    debug!("{} was never created", path.display());
                    return None;
                }
            }
            Err(err) => {
                debug!("Failed to open file to tail: {err}");
                return None;
            }
        }
        tokio::select! {
            () = cancel.cancelled() => {}
            () = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use regex::Regex;

    use crate::{LineFilter, TailSink};

    use super::Tailer;

    const INTERVAL: Duration = Duration::from_millis(5);

    #[derive(Debug, Default, Clone)]
    struct Collect(Arc<Mutex<Vec<String>>>);

    impl Collect {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        async fn wait_for(&self, count: usize) {
            for _ in 0..1000 {
                if self.0.lock().unwrap().len() >= count {
                    return;
                }
                tokio::time::sleep(INTERVAL).await;
            }
            panic!("Timed out waiting for {count} lines, got {:?}", self.lines());
        }
    }

    impl TailSink for Collect {
        fn line(&mut self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    fn append(path: &std::path::Path, contents: &str) {
        let mut file = fs_err::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn partial_lines_wait_for_terminator() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pip.log");
        append(&path, "Collecting six\nDownloading six");

        let collect = Collect::default();
        let mut tailer =
            Tailer::with_poll_interval(&path, LineFilter::all(), collect.clone(), INTERVAL);

        collect.wait_for(1).await;
        tokio::time::sleep(INTERVAL * 10).await;
        assert_eq!(collect.lines(), ["Collecting six"]);

        append(&path, "-1.16.0.whl\r\nSaved ./six-1.16.0-py2.py3-none-any.whl");
        collect.wait_for(2).await;
        assert_eq!(
            collect.lines(),
            ["Collecting six", "Downloading six-1.16.0.whl"]
        );

        // Stopping drains the unterminated tail.
        let sink = tailer.stop().await.unwrap();
        assert_eq!(
            sink.lines(),
            [
                "Collecting six",
                "Downloading six-1.16.0.whl",
                "Saved ./six-1.16.0-py2.py3-none-any.whl"
            ]
        );
    }

    #[tokio::test]
    async fn stop_drains_unread_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pip.log");

        let collect = Collect::default();
        let mut tailer =
            Tailer::with_poll_interval(&path, LineFilter::all(), collect.clone(), INTERVAL);
        tokio::time::sleep(INTERVAL * 4).await;

        append(&path, "one\ntwo\n");
        append(&path, "three");
        let sink = tailer.stop().await.unwrap();
        assert_eq!(sink.lines(), ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn file_never_created() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pip.log");

        let collect = Collect::default();
        let mut tailer =
            Tailer::with_poll_interval(&path, LineFilter::all(), collect.clone(), INTERVAL);
        tokio::time::sleep(INTERVAL * 4).await;

        let sink = tailer.stop().await.unwrap();
        assert!(sink.lines().is_empty());
    }

    #[tokio::test]
    async fn unreadable_path_ends_tailing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pip.log");
        fs_err::create_dir(&path).unwrap();

        let collect = Collect::default();
        let mut tailer =
            Tailer::with_poll_interval(&path, LineFilter::all(), collect.clone(), INTERVAL);
        tokio::time::sleep(INTERVAL * 4).await;

        let sink = tailer.stop().await.unwrap();
        assert!(sink.lines().is_empty());
        assert!(tailer.stop().await.is_none());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pip.log");
        append(&path, "one\n");

        let collect = Collect::default();
        let mut tailer =
            Tailer::with_poll_interval(&path, LineFilter::all(), collect.clone(), INTERVAL);

        assert!(tailer.stop().await.is_some());
        assert!(tailer.stop().await.is_none());
        assert_eq!(collect.lines(), ["one"]);
    }

    #[tokio::test]
    async fn filtered() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pip.log");
        append(
            &path,
            "2021-01-04T16:12:01,119 Collecting six\n\
             2021-01-04T16:12:02,119 INFO: pip is looking at multiple versions of six to determine which version is compatible with other requirements.\n\
             2021-01-04T16:12:03,119 Saved six\n",
        );

        let filter = LineFilter::new([Regex::new(r"^[^ ]+ INFO: (.*)$").unwrap()]).unwrap();
        let mut tailer = Tailer::with_poll_interval(&path, filter, Collect::default(), INTERVAL);
        let sink = tailer.stop().await.unwrap();
        assert_eq!(
            sink.lines(),
            ["pip is looking at multiple versions of six to determine which version is compatible with other requirements."]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("pip.log");
        fs_err::write(&path, b"caf\xe9\n").unwrap();

        let mut tailer =
            Tailer::with_poll_interval(&path, LineFilter::all(), Collect::default(), INTERVAL);
        let sink = tailer.stop().await.unwrap();
        assert_eq!(sink.lines(), ["caf\u{fffd}"]);
    }
}
