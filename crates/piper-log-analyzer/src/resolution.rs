use std::sync::LazyLock;

use regex::Regex;

use crate::analyzer::{ErrorAnalysis, ErrorAnalyzer, ErrorMessage};

static CANNOT_INSTALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<timestamp>[^ ]+) ERROR: Cannot install ").unwrap());

static RESOLUTION_IMPOSSIBLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^ ]+ ERROR: ResolutionImpossible: ").unwrap());

/// Recovers the explanation of a dependency conflict from a pip `--log` file.
///
/// With the 2020 resolver, pip only prints `ResolutionImpossible` on stderr; the useful part of
/// the report, which packages conflict and why, only makes it to the log:
///
/// ```text
/// 2021-01-04T16:12:01,119 ERROR: Cannot install pantsbuild-pants==1.24.0.dev2 and wheel==0.33.6 because these package versions have conflicting dependencies.
/// 2021-01-04T16:12:01,119
/// 2021-01-04T16:12:01,119 The conflict is caused by:
/// 2021-01-04T16:12:01,119     The user requested wheel==0.33.6
/// 2021-01-04T16:12:01,119     pantsbuild-pants 1.24.0.dev2 depends on wheel==0.31.1
/// 2021-01-04T16:12:01,119 ERROR: ResolutionImpossible: for help visit https://pip.pypa.io/en/latest/user_guide/#fixing-conflicting-dependencies
/// ```
///
/// Every line between the two `ERROR:` markers is reported, with the timestamp column removed.
/// See: <https://github.com/pypa/pip/issues/9420>
#[derive(Debug, Default, Clone)]
pub struct ResolutionImpossibleAnalyzer {
    /// The width of the timestamp column, once the start of the report has been seen.
    strip: Option<usize>,
}

impl ResolutionImpossibleAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorAnalyzer for ResolutionImpossibleAnalyzer {
    fn analyze(&mut self, line: &str) -> ErrorAnalysis {
        let Some(strip) = self.strip else {
            if let Some(captures) = CANNOT_INSTALL.captures(line) {
                self.strip = Some(captures["timestamp"].len());
            }
            return ErrorAnalysis::Continue(None);
        };

        if RESOLUTION_IMPOSSIBLE.is_match(line) {
            return ErrorAnalysis::Complete(None);
        }

        // Drop the timestamp and the single space separating it from the message, keeping the
        // message's own indentation. Blank report lines may lack the separator.
        let message = line
            .get(strip..)
            .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
            .unwrap_or_default();
        ErrorAnalysis::Continue(Some(ErrorMessage::new(message)))
    }
}
