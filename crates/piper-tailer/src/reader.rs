use std::borrow::Cow;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Splits an incrementally growing stream into lines.
///
/// A trailing line without a terminator is held back until its terminator arrives or the
/// reader is flushed.
pub(crate) struct LineReader<R> {
    reader: R,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }

    /// Read everything available right now, passing each complete line to `on_line`.
    pub(crate) async fn read_lines(&mut self, mut on_line: impl FnMut(&str)) -> io::Result<()> {
        let mut chunk = [0u8; 8192];
        loop {
            let read = self.reader.read(&mut chunk).await?;
            if read == 0 {
                return Ok(());
            }
            self.pending.extend_from_slice(&chunk[..read]);

            let mut start = 0;
            while let Some(offset) = memchr::memchr(b'\n', &self.pending[start..]) {
                let end = start + offset;
                on_line(&decode(&self.pending[start..end]));
                start = end + 1;
            }
            self.pending.drain(..start);
        }
    }

    /// Pass on a pending unterminated line, if any.
    pub(crate) fn flush(&mut self, mut on_line: impl FnMut(&str)) {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            on_line(&decode(&pending));
        }
    }
}

fn decode(line: &[u8]) -> Cow<'_, str> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line)
}
