use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Network settings for a `pip` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NetworkConfiguration {
    /// A proxy URL used for both HTTP and HTTPS traffic.
    pub proxy: Option<String>,
    /// A CA bundle used to verify index servers.
    pub cert: Option<PathBuf>,
    /// A client certificate (with its key) presented to index servers.
    pub client_cert: Option<PathBuf>,
    /// The number of times a failed connection is retried.
    pub retries: u32,
    /// The socket timeout, in seconds.
    pub timeout: u64,
}

impl NetworkConfiguration {
    pub const DEFAULT_RETRIES: u32 = 5;
    pub const DEFAULT_TIMEOUT: u64 = 15;
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        Self {
            proxy: None,
            cert: None,
            client_cert: None,
            retries: Self::DEFAULT_RETRIES,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}
