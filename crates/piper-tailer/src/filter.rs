use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Filter pattern `{0}` has {1} capture groups, but at most one is allowed")]
    TooManyGroups(String, usize),
}

/// Selects the lines worth forwarding.
///
/// A line passes if it matches any pattern. If the first matching pattern has a capture group
/// that participated in the match, only the captured text is forwarded; otherwise the whole
/// line is. An empty filter passes every line.
#[derive(Debug, Clone, Default)]
pub struct LineFilter {
    patterns: Vec<Regex>,
}

impl LineFilter {
    /// A filter that passes every line unchanged.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(patterns: impl IntoIterator<Item = Regex>) -> Result<Self, FilterError> {
        let patterns = patterns.into_iter().collect::<Vec<_>>();
        for pattern in &patterns {
            // Group zero is the implicit whole-match group.
            let groups = pattern.captures_len() - 1;
            if groups > 1 {
                return Err(FilterError::TooManyGroups(
                    pattern.as_str().to_string(),
                    groups,
                ));
            }
        }
        Ok(Self { patterns })
    }

    /// Returns the text to forward for `line`, or `None` if it's filtered out.
    pub fn apply<'line>(&self, line: &'line str) -> Option<&'line str> {
        if self.patterns.is_empty() {
            return Some(line);
        }
        self.patterns.iter().find_map(|pattern| {
            let captures = pattern.captures(line)?;
            Some(captures.get(1).map_or(line, |group| group.as_str()))
        })
    }
}
