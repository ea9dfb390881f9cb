use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use crate::platform::Platform;
use crate::tags::CompatibilityTags;

/// A Python interpreter, as discovered by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    python: PathBuf,
    major: u8,
    minor: u8,
    sys_path: Vec<PathBuf>,
    supported_tags: CompatibilityTags,
}

impl Interpreter {
    pub fn new(python: impl Into<PathBuf>, major: u8, minor: u8) -> Self {
        Self {
            python: python.into(),
            major,
            minor,
            sys_path: Vec::new(),
            supported_tags: CompatibilityTags::default(),
        }
    }

    #[must_use]
    pub fn with_sys_path(mut self, sys_path: impl IntoIterator<Item = PathBuf>) -> Self {
        self.sys_path = sys_path.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_supported_tags(mut self, supported_tags: CompatibilityTags) -> Self {
        self.supported_tags = supported_tags;
        self
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    pub fn sys_path(&self) -> &[PathBuf] {
        &self.sys_path
    }

    pub fn supported_tags(&self) -> &CompatibilityTags {
        &self.supported_tags
    }
}

impl Display for Interpreter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Python {}.{} at `{}`",
            self.major,
            self.minor,
            self.python.display()
        )
    }
}

/// What pip resolves, builds or installs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A local interpreter, which pip can run under.
    Local(Interpreter),
    /// A platform with no local interpreter.
    ///
    /// Pip runs under `interpreter`, but is made to consider `supported_tags` (e.g., from
    /// `pip debug` for the platform) the compatible tags.
    Foreign {
        platform: Platform,
        interpreter: Interpreter,
        supported_tags: CompatibilityTags,
    },
}

impl Target {
    /// The interpreter pip runs under.
    pub fn interpreter(&self) -> &Interpreter {
        match self {
            Self::Local(interpreter) | Self::Foreign { interpreter, .. } => interpreter,
        }
    }

    pub fn platform(&self) -> Option<&Platform> {
        match self {
            Self::Local(_) => None,
            Self::Foreign { platform, .. } => Some(platform),
        }
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self, Self::Foreign { .. })
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(interpreter) => write!(f, "{interpreter}"),
            Self::Foreign { platform, .. } => write!(f, "{platform}"),
        }
    }
}
