use std::io;
use std::path::PathBuf;

use thiserror::Error;

use piper_patches::PatchError;

use crate::platform::Platform;
use crate::tags::TagError;

/// An invalid request, detected before anything is spawned.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(
        "Cannot both ignore wheels (`use_wheel = false`) and refrain from building distributions (`build = false`)"
    )]
    NoWheelsNoBuild,
    #[error("Cannot ignore wheels (`use_wheel = false`) when resolving for a foreign platform: {0}")]
    NoWheelsForeignPlatform(Platform),
    #[error(
        "Cannot compile bytecode for `{}` because the wheel is for a foreign platform: {platform}",
        wheel.display()
    )]
    CompileForeignPlatform { wheel: PathBuf, platform: Platform },
    #[error(transparent)]
    Patches(#[from] PatchError),
    #[error(transparent)]
    Tags(#[from] TagError),
    #[error("Failed to serialize the compatibility tags patch")]
    TagsPatch(#[source] serde_json::Error),
    #[error("Failed to join `{0}` entries")]
    SearchPath(&'static str, #[source] std::env::JoinPathsError),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Job(#[from] piper_job::Error),
    #[error("Failed to write pip runtime patches")]
    Patches(#[source] io::Error),
    #[error("Failed to create the pip log")]
    Log(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Failed to parse `pip debug` output")]
    Debug(#[source] TagError),
}
