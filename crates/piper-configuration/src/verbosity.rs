use serde::{Deserialize, Serialize};

/// The verbosity `pip` runs with.
///
/// `pip` tops out at `-vvv`; anything louder is clamped. Zero means `-q`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipVerbosity(u8);

impl PipVerbosity {
    pub const MAX: u8 = 3;

    pub fn new(level: u8) -> Self {
        Self(level.min(Self::MAX))
    }

    /// Scale a `piper` verbosity (up to nine levels) down to `pip`'s three.
    pub fn from_piper_verbosity(level: u8) -> Self {
        Self::new(level / 3)
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn is_quiet(self) -> bool {
        self.0 == 0
    }

    /// The single flag selecting this verbosity.
    pub fn flag(self) -> String {
        if self.is_quiet() {
            "-q".to_string()
        } else {
            format!("-{}", "v".repeat(usize::from(self.0)))
        }
    }
}
