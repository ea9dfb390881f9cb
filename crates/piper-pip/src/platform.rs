use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("Invalid platform `{0}`: expected `<platform>-<implementation>-<version>-<abi>`, e.g., `linux_x86_64-cp-311-cp311`")]
pub struct PlatformParseError(String);

/// A target platform, in the form pip's `--platform`, `--implementation`, `--python-version` and
/// `--abi` options describe it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    platform: String,
    implementation: String,
    version: String,
    abi: String,
}

impl Platform {
    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn abi(&self) -> &str {
        &self.abi
    }

    /// The `pip debug` arguments selecting this platform.
    ///
    /// When a manylinux tag is given for a linux platform, it's offered first, e.g.,
    /// `--platform manylinux2014_x86_64 --platform linux_x86_64`.
    pub fn debug_args(&self, manylinux: Option<&str>) -> Vec<String> {
        let mut args = Vec::with_capacity(10);
        if let Some(manylinux) = manylinux {
            if let Some(arch) = self.platform.strip_prefix("linux") {
                args.push("--platform".to_string());
                args.push(format!("{manylinux}{arch}"));
            }
        }
        args.extend([
            "--platform".to_string(),
            self.platform.clone(),
            "--implementation".to_string(),
            self.implementation.clone(),
            "--python-version".to_string(),
            self.version.clone(),
            "--abi".to_string(),
            self.abi.clone(),
        ]);
        args
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.platform, self.implementation, self.version, self.abi
        )
    }
}

impl FromStr for Platform {
    type Err = PlatformParseError;

    fn from_str(platform: &str) -> Result<Self, Self::Err> {
        let parts = platform.split('-').collect::<Vec<_>>();
        let [plat, implementation, version, abi] = parts.as_slice() else {
            return Err(PlatformParseError(platform.to_string()));
        };
        if [plat, implementation, version, abi]
            .iter()
            .any(|part| part.is_empty())
            || !version.chars().all(|c| c.is_ascii_digit() || c == '.')
        {
            return Err(PlatformParseError(platform.to_string()));
        }
        Ok(Self {
            platform: (*plat).to_string(),
            implementation: (*implementation).to_string(),
            version: (*version).to_string(),
            abi: (*abi).to_string(),
        })
    }
}
