use piper_logging::Level;

use crate::AmbientEnv;

/// Install piper's `tracing` subscriber and turn on user-facing warnings.
///
/// Both follow `PIPER_VERBOSE`, the same variable that sets the verbosity of the wrapped pip.
/// Fails if a global subscriber is already installed.
pub fn setup_logging(env: &AmbientEnv) -> anyhow::Result<()> {
    piper_warnings::enable();
    piper_logging::setup_logging(Level::from_verbosity(env.piper_verbosity()))
}
