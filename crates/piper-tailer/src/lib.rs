pub use filter::{FilterError, LineFilter};
pub use sink::{TailSink, WriterSink};
pub use tailer::Tailer;

mod filter;
mod reader;
mod sink;
mod tailer;
