use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

use tracing::debug;

use piper_static::EnvVars;

/// The environment piper was run in.
///
/// The environment is passed explicitly rather than read from the process, so that what a pip
/// invocation inherits is determined by its inputs alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmbientEnv(BTreeMap<OsString, OsString>);

impl AmbientEnv {
    /// Capture the environment of the current process.
    pub fn from_process() -> Self {
        Self(std::env::vars_os().collect())
    }

    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.0.get(key.as_ref()).map(OsString::as_os_str)
    }

    /// The verbosity requested through `PIPER_VERBOSE`; unset or invalid values mean `0`.
    pub fn piper_verbosity(&self) -> u8 {
        let Some(value) = self.get(EnvVars::PIPER_VERBOSE) else {
            return 0;
        };
        match value.to_str().map(str::parse::<u8>) {
            Some(Ok(level)) => level,
            _ => {
                debug!(
                    "Ignoring invalid `{}` value: `{}`",
                    EnvVars::PIPER_VERBOSE,
                    value.to_string_lossy()
                );
                0
            }
        }
    }

    /// The environment to pass on to a child, without piper's own variables and `PYTHONPATH`.
    pub(crate) fn scrubbed(&self) -> BTreeMap<OsString, OsString> {
        self.0
            .iter()
            .filter(|(key, value)| {
                if key.as_os_str() == EnvVars::PYTHONPATH {
                    debug!(
                        "Scrubbed {}={} from the pip environment",
                        EnvVars::PYTHONPATH,
                        value.to_string_lossy()
                    );
                    return false;
                }
                !key.to_string_lossy().starts_with(EnvVars::PIPER_PREFIX)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl<K: Into<OsString>, V: Into<OsString>> FromIterator<(K, V)> for AmbientEnv {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}
