use std::fmt::{Display, Formatter};

/// A fragment of an error report recovered from a log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorMessage(String);

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ErrorMessage {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for ErrorMessage {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// The verdict of an [`ErrorAnalyzer`] on a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorAnalysis {
    /// Keep feeding lines to the analyzer.
    Continue(Option<ErrorMessage>),
    /// The analyzer is done; it won't be shown any more lines.
    Complete(Option<ErrorMessage>),
}

impl ErrorAnalysis {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn into_message(self) -> Option<ErrorMessage> {
        match self {
            Self::Continue(message) | Self::Complete(message) => message,
        }
    }
}

/// A stateful scanner over the lines of a single log.
///
/// Each analyzer is used for exactly one log, so it may keep whatever state it needs between
/// lines.
pub trait ErrorAnalyzer: Send {
    fn analyze(&mut self, line: &str) -> ErrorAnalysis;
}

impl<T: ErrorAnalyzer + ?Sized> ErrorAnalyzer for Box<T> {
    fn analyze(&mut self, line: &str) -> ErrorAnalysis {
        (**self).analyze(line)
    }
}
