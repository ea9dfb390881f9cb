/// Declares all environment variable used throughout `piper` and its crates.
pub struct EnvVars;

impl EnvVars {
    /// The verbosity of `piper` itself, as an integer. The wrapped `pip` runs at one third of
    /// this level (`-v` per three levels, at most `-vvv`), unless a call site requests an
    /// explicit pip verbosity.
    pub const PIPER_VERBOSE: &'static str = "PIPER_VERBOSE";

    /// Prefix shared by every `piper` variable. Variables carrying this prefix are stripped from
    /// the environment handed to `pip`, so that an outer `piper` invocation cannot leak its
    /// configuration into the subprocess.
    pub const PIPER_PREFIX: &'static str = "PIPER_";

    /// Additional `sys.path` entries for the `pip` runtime, separated by the platform path
    /// separator. Used to make emitted runtime patches importable.
    pub const PIPER_EXTRA_SYS_PATH: &'static str = "PIPER_EXTRA_SYS_PATH";

    /// Names the package holding runtime patches. The `pip` runtime hook imports every module
    /// of this package before `pip` starts.
    pub const PIPER_PIP_RUNTIME_PATCHES_PACKAGE: &'static str =
        "_PIPER_PIP_RUNTIME_PATCHES_PACKAGE";

    /// A JSON list of compatibility tags `pip` is made to consider supported, used when
    /// resolving for or installing a wheel built for a foreign platform.
    pub const PIPER_PATCHED_TAGS: &'static str = "_PIPER_PATCHED_TAGS";

    /// Search path for Python modules. Scrubbed from the `pip` environment, since an ambient
    /// value can prevent the `pip` runtime from bootstrapping.
    pub const PYTHONPATH: &'static str = "PYTHONPATH";

    /// Directory `pip` uses for temporary files. Always pointed inside the `pip` cache so that
    /// renames from temporary files into the cache are atomic.
    pub const TMPDIR: &'static str = "TMPDIR";

    /// Proxy for plain HTTP connections. Honored by `pip` even in `--isolated` mode.
    pub const HTTP_PROXY: &'static str = "http_proxy";

    /// Proxy for HTTPS connections. Honored by `pip` even in `--isolated` mode.
    pub const HTTPS_PROXY: &'static str = "https_proxy";

    /// CA bundle read by the vendored `requests` library; honored even in `--isolated` mode.
    pub const REQUESTS_CA_BUNDLE: &'static str = "REQUESTS_CA_BUNDLE";

    /// Equivalent to `pip --cert`. Only read when `pip` is not in `--isolated` mode.
    pub const PIP_CERT: &'static str = "PIP_CERT";

    /// Equivalent to `pip --client-cert`. Only read when `pip` is not in `--isolated` mode.
    pub const PIP_CLIENT_CERT: &'static str = "PIP_CLIENT_CERT";

    /// `sys.path` made available to PEP 517 build backends when build isolation is disabled.
    pub const PEP517_BACKEND_PATH: &'static str = "PEP517_BACKEND_PATH";

    /// Used to set `RUST_LOG` for `tracing` filtering.
    pub const RUST_LOG: &'static str = "RUST_LOG";
}
