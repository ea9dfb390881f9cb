//! Compose runtime patches for pip.
//!
//! A [`PatchContribution`] alters pip's behavior for one invocation, through environment
//! variables and Python modules that pip's bootstrap imports before running. The contributions
//! for an invocation are merged into a [`PatchSet`], which rejects conflicting contributions
//! before anything is spawned, and then emitted as a Python package on disk.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

use piper_static::EnvVars;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Can only apply one patch to `{0}`, but it was patched more than once")]
    Conflict(String),
    #[error("Patches disagree on the value of `{0}`: `{1}` vs. `{2}`")]
    EnvConflict(String, String, String),
    #[error("Patch module name `{0}` is not a valid Python identifier")]
    InvalidModuleName(String),
    #[error("Patch module `{0}` is provided more than once")]
    DuplicateModule(String),
}

/// A Python module injected into the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchModule {
    name: String,
    code: Cow<'static, str>,
}

impl PatchModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

/// A behavior change for a single piece of pip, e.g., the function computing the supported
/// compatibility tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchContribution {
    target: String,
    env: BTreeMap<String, OsString>,
    modules: Vec<PatchModule>,
}

impl PatchContribution {
    /// A patch of `target`, the identifier of the pip code being altered.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            env: BTreeMap::new(),
            modules: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_module(
        mut self,
        name: impl Into<String>,
        code: impl Into<Cow<'static, str>>,
    ) -> Self {
        self.modules.push(PatchModule {
            name: name.into(),
            code: code.into(),
        });
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn env(&self) -> &BTreeMap<String, OsString> {
        &self.env
    }

    pub fn modules(&self) -> &[PatchModule] {
        &self.modules
    }
}

/// The merged patches of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    env: BTreeMap<String, OsString>,
    modules: Vec<PatchModule>,
    targets: Vec<String>,
}

impl PatchSet {
    /// Merge the given contributions.
    ///
    /// Fails if two contributions patch the same target, set the same environment variable to
    /// different values, or provide modules of the same name.
    pub fn compose(
        contributions: impl IntoIterator<Item = PatchContribution>,
    ) -> Result<Self, PatchError> {
        let mut patch_set = Self::default();
        for contribution in contributions {
            patch_set.add(contribution)?;
        }
        Ok(patch_set)
    }

    fn add(&mut self, contribution: PatchContribution) -> Result<(), PatchError> {
        let PatchContribution {
            target,
            env,
            modules,
        } = contribution;

        if self.targets.contains(&target) {
            return Err(PatchError::Conflict(target));
        }
        for module in &modules {
            if !IDENTIFIER.is_match(&module.name) {
                return Err(PatchError::InvalidModuleName(module.name.clone()));
            }
            if self
                .modules
                .iter()
                .any(|existing| existing.name == module.name)
            {
                return Err(PatchError::DuplicateModule(module.name.clone()));
            }
        }
        for (key, value) in env {
            match self.env.entry(key) {
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
                Entry::Occupied(entry) => {
                    if *entry.get() != value {
                        return Err(PatchError::EnvConflict(
                            entry.key().clone(),
                            entry.get().to_string_lossy().into_owned(),
                            value.to_string_lossy().into_owned(),
                        ));
                    }
                }
            }
        }

        self.targets.push(target);
        self.modules.extend(modules);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The patched targets, in the order they were contributed.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(String::as_str)
    }

    /// The environment variables requested by all contributions.
    pub fn env(&self) -> &BTreeMap<String, OsString> {
        &self.env
    }

    /// Write the patch modules into a fresh directory as the Python package `package`.
    ///
    /// Returns `None` if there are no modules to write. The package's `__init__.py` lists the
    /// modules in `__all__`, in contribution order.
    pub fn emit(&self, package: &str) -> io::Result<Option<EmittedPatches>> {
        if self.modules.is_empty() {
            return Ok(None);
        }
        if !IDENTIFIER.is_match(package) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Patch package name `{package}` is not a valid Python identifier"),
            ));
        }

        let dir = tempfile::Builder::new()
            .prefix("piper-pip-patches.")
            .tempdir()?;
        let package_dir = dir.path().join(package);
        fs_err::create_dir(&package_dir)?;

        let mut init = String::from("__all__ = [\n");
        for module in &self.modules {
            init.push_str(&format!("    {:?},\n", module.name));
            fs_err::write(
                package_dir.join(format!("{}.py", module.name)),
                module.code.as_bytes(),
            )?;
        }
        init.push_str("]\n");
        fs_err::write(package_dir.join("__init__.py"), init)?;

        debug!(
            "Emitted pip patches for {} to {}",
            self.targets.join(", "),
            package_dir.display()
        );
        Ok(Some(EmittedPatches {
            dir,
            package: package.to_string(),
        }))
    }
}

/// A patch package on disk, removed when dropped.
#[derive(Debug)]
pub struct EmittedPatches {
    dir: TempDir,
    package: String,
}

impl EmittedPatches {
    /// The directory to add to the child's `sys.path`.
    pub fn sys_path(&self) -> &Path {
        self.dir.path()
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// The environment variables pointing the child at the patch package.
    pub fn env(&self) -> [(&'static str, &OsStr); 2] {
        [
            (EnvVars::PIPER_EXTRA_SYS_PATH, self.sys_path().as_os_str()),
            (
                EnvVars::PIPER_PIP_RUNTIME_PATCHES_PACKAGE,
                OsStr::new(&self.package),
            ),
        ]
    }
}
