use std::fmt::{Display, Formatter};

use url::Url;

/// A host `pip` is told to trust despite serving over plain HTTP, as passed to `--trusted-host`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrustedHost {
    host: String,
    port: Option<u16>,
}

impl TrustedHost {
    /// Returns the [`TrustedHost`] for an index or find-links location, if it is served over
    /// plain HTTP.
    ///
    /// Locations that are not URLs (e.g., local directories passed to `--find-links`) are never
    /// trusted.
    pub fn from_insecure_location(location: &str) -> Option<Self> {
        let url = Url::parse(location).ok()?;
        if url.scheme() != "http" {
            return None;
        }
        Some(Self {
            host: url.host_str()?.to_string(),
            port: url.port(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Display for TrustedHost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{port}", self.host),
            None => f.write_str(&self.host),
        }
    }
}
