use std::io::Write;

use tracing::debug;

/// Receives the lines a [`Tailer`](crate::Tailer) forwards, in file order.
///
/// Lines arrive without their terminator.
pub trait TailSink: Send + 'static {
    fn line(&mut self, line: &str);
}

impl TailSink for Box<dyn TailSink> {
    fn line(&mut self, line: &str) {
        (**self).line(line);
    }
}

/// Writes each line, newline-terminated, to a writer.
///
/// Write errors are logged and otherwise ignored: a broken output stream must not fail the job
/// being observed.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send + 'static> TailSink for WriterSink<W> {
    fn line(&mut self, line: &str) {
        if let Err(err) = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush()) {
            debug!("Failed to forward log line: {err}");
        }
    }
}
