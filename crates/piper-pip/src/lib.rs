//! Run pip, isolated from its ambient configuration, for downloading, building and installing
//! distributions.

pub use environment::AmbientEnv;
pub use error::{ConfigurationError, Error};
pub use interpreter::{Interpreter, Target};
pub use logging::setup_logging;
pub use observer::DownloadObserver;
pub use pip::{
    BuildWheelsRequest, DownloadRequest, InstallWheelRequest, Pip, PipJob, PipVenv,
};
pub use platform::{Platform, PlatformParseError};
pub use runtime_patches::{TAGS_PATCH_TARGET, tags_patch};
pub use tags::{CompatibilityTags, Tag, TagError};

mod environment;
mod error;
mod interpreter;
mod logging;
mod observer;
mod pip;
mod platform;
mod runtime_patches;
mod tags;
