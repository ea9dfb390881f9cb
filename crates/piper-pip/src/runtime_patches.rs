use piper_patches::PatchContribution;
use piper_static::EnvVars;

use crate::error::ConfigurationError;
use crate::tags::CompatibilityTags;

/// The name of the package pip's runtime patches are emitted as.
pub(crate) const PATCHES_PACKAGE: &str = "_piper_pip_patches";

/// The function pip uses to compute the compatibility tags of the interpreter it runs under.
pub const TAGS_PATCH_TARGET: &str = "pip._internal.utils.compatibility_tags.get_supported";

/// A patch making pip consider exactly `tags` compatible, regardless of its interpreter.
pub fn tags_patch(tags: &CompatibilityTags) -> Result<PatchContribution, ConfigurationError> {
    let tags = tags.to_json().map_err(ConfigurationError::TagsPatch)?;
    Ok(PatchContribution::new(TAGS_PATCH_TARGET)
        .with_env(EnvVars::PIPER_PATCHED_TAGS, tags)
        .with_module("patch_tags", include_str!("patches/tags.py")))
}
