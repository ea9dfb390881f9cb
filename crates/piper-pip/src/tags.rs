use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("Invalid compatibility tag `{0}`: expected `<python>-<abi>-<platform>`")]
    InvalidTag(String),
    #[error("Invalid wheel filename `{0}`: expected `<name>-<version>[-<build>]-<python>-<abi>-<platform>.whl`")]
    InvalidWheelFilename(String),
}

/// A single compatibility tag, e.g., `cp311-cp311-manylinux_2_17_x86_64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    python: String,
    abi: String,
    platform: String,
}

impl Tag {
    pub fn new(
        python: impl Into<String>,
        abi: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            python: python.into(),
            abi: abi.into(),
            platform: platform.into(),
        }
    }

    pub fn python(&self) -> &str {
        &self.python
    }

    pub fn abi(&self) -> &str {
        &self.abi
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.python, self.abi, self.platform)
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let mut parts = tag.splitn(3, '-');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(python), Some(abi), Some(platform))
                if !python.is_empty() && !abi.is_empty() && !platform.is_empty() =>
            {
                Ok(Self::new(python, abi, platform))
            }
            _ => Err(TagError::InvalidTag(tag.to_string())),
        }
    }
}

/// An ordered set of compatibility tags, most preferred first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatibilityTags(Vec<Tag>);

impl CompatibilityTags {
    pub fn new(tags: impl IntoIterator<Item = Tag>) -> Self {
        let mut compatibility_tags = Self::default();
        compatibility_tags.extend(tags);
        compatibility_tags
    }

    /// The tags a wheel declares in its filename, expanding compressed tag sets like `py2.py3`.
    pub fn from_wheel(wheel: &Path) -> Result<Self, TagError> {
        let invalid = || TagError::InvalidWheelFilename(wheel.display().to_string());

        let filename = wheel
            .file_name()
            .and_then(|filename| filename.to_str())
            .ok_or_else(invalid)?;
        let stem = filename.strip_suffix(".whl").ok_or_else(invalid)?;
        let parts = stem.split('-').collect::<Vec<_>>();
        let [python, abi, platform] = match parts.as_slice() {
            [_, _, python, abi, platform] | [_, _, _, python, abi, platform] => {
                [*python, *abi, *platform]
            }
            _ => return Err(invalid()),
        };

        let mut tags = Vec::new();
        for python in python.split('.') {
            for abi in abi.split('.') {
                for platform in platform.split('.') {
                    tags.push(Tag::new(python, abi, platform));
                }
            }
        }
        Ok(Self::new(tags))
    }

    /// Parse the `Compatible tags` section of `pip debug --verbose` output.
    pub fn from_pip_debug(output: &str) -> Result<Self, TagError> {
        let lines = output
            .lines()
            .skip_while(|line| !line.starts_with("Compatible tags: "))
            .skip(1);
        let mut tags = Vec::new();
        for line in lines {
            // The tags are indented; the section ends at the next unindented line.
            if !line.starts_with(char::is_whitespace) {
                break;
            }
            tags.push(Tag::from_str(line.trim())?);
        }
        Ok(Self::new(tags))
    }

    /// Append the given tags, skipping any already present.
    pub fn extend(&mut self, tags: impl IntoIterator<Item = Tag>) {
        for tag in tags {
            if !self.0.contains(&tag) {
                self.0.push(tag);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The tags as a JSON array of strings.
    pub(crate) fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0.iter().map(ToString::to_string).collect::<Vec<_>>())
    }
}

impl<'a> IntoIterator for &'a CompatibilityTags {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
