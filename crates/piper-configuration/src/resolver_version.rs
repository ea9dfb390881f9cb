use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// The `pip` dependency resolver to request.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub enum ResolverVersion {
    /// The resolver `pip` shipped before 20.3.
    PipLegacy,
    /// The backtracking resolver introduced in `pip` 20.3.
    #[default]
    Pip2020,
}

impl ResolverVersion {
    /// The arguments selecting this resolver for an interpreter with the given major version.
    ///
    /// `pip` defaults to the legacy resolver under Python 2 and to the 2020 resolver under
    /// Python 3, and warns when asked for the default explicitly, so arguments are only emitted
    /// when they differ from the interpreter's default.
    pub fn args(self, python_major: u8) -> &'static [&'static str] {
        match (self, python_major) {
            (Self::Pip2020, 2) => &["--use-feature", "2020-resolver"],
            (Self::PipLegacy, 3) => &["--use-deprecated", "legacy-resolver"],
            _ => &[],
        }
    }
}

impl Display for ResolverVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PipLegacy => f.write_str("pip-legacy"),
            Self::Pip2020 => f.write_str("pip-2020"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ResolverVersion;

    #[test]
    fn args_only_when_not_default() {
        assert!(ResolverVersion::Pip2020.args(3).is_empty());
        assert!(ResolverVersion::PipLegacy.args(2).is_empty());
        assert_eq!(
            ResolverVersion::Pip2020.args(2),
            &["--use-feature", "2020-resolver"]
        );
        assert_eq!(
            ResolverVersion::PipLegacy.args(3),
            &["--use-deprecated", "legacy-resolver"]
        );
    }

    #[test]
    fn deserialize() {
        let version: ResolverVersion = serde_json::from_str(r#""pip-legacy""#).unwrap();
        assert_eq!(version, ResolverVersion::PipLegacy);
        assert_eq!(ResolverVersion::default().to_string(), "pip-2020");
    }
}
