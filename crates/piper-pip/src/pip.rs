use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument};

use piper_configuration::{PackageIndexConfiguration, PipVerbosity, ResolverVersion};
use piper_job::{Finalizer, Invocation, Job, Stdout};
use piper_log_analyzer::{
    ErrorAnalyzer, Forward, LogScrapeJob, ResolutionImpossibleAnalyzer, ScrapeLog,
};
use piper_patches::{EmittedPatches, PatchSet};
use piper_static::EnvVars;
use piper_tailer::{LineFilter, WriterSink};
use piper_warnings::warn_user;

use crate::environment::AmbientEnv;
use crate::error::{ConfigurationError, Error};
use crate::interpreter::{Interpreter, Target};
use crate::observer::DownloadObserver;
use crate::platform::Platform;
use crate::runtime_patches::{PATCHES_PACKAGE, tags_patch};
use crate::tags::CompatibilityTags;

/// The progress messages of the 2020 resolver worth showing while it backtracks.
static BACKTRACKING: LazyLock<LineFilter> = LazyLock::new(|| {
    LineFilter::new([
        Regex::new(
            r"^.*(pip is looking at multiple versions of \S+ to determine which version is compatible with other requirements\. This could take a while\.).*$",
        )
        .unwrap(),
        Regex::new(
            r"^.*(This is taking longer than usual\. You might need to provide the dependency resolver with stricter constraints to reduce runtime\. If you want to abort this run,? (?:you )?can press Ctrl \+ C to do so\. To improve how pip performs, tell us what happened here: https://pip\.pypa\.io/surveys/backtracking).*$",
        )
        .unwrap(),
    ])
    .unwrap()
});

/// A virtual environment with pip installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipVenv {
    venv_dir: PathBuf,
    interpreter: Interpreter,
    execute_args: Vec<OsString>,
}

impl PipVenv {
    /// A venv in which pip is run as `<python> <execute_args>... <pip args>...`, e.g., with
    /// `execute_args` of `-m pip`.
    pub fn new(
        venv_dir: impl Into<PathBuf>,
        interpreter: Interpreter,
        execute_args: impl IntoIterator<Item = impl Into<OsString>>,
    ) -> Self {
        Self {
            venv_dir: venv_dir.into(),
            interpreter,
            execute_args: execute_args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn venv_dir(&self) -> &Path {
        &self.venv_dir
    }

    /// The venv's interpreter, which pip runs under.
    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// The arguments following the interpreter to run pip with `args`.
    pub fn execute_args(&self, args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
        self.execute_args.iter().cloned().chain(args).collect()
    }
}

/// The options of a `pip download`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub download_dir: PathBuf,
    pub requirements: Vec<String>,
    pub requirement_files: Vec<PathBuf>,
    pub constraint_files: Vec<PathBuf>,
    pub allow_prereleases: bool,
    /// Download the dependencies of the requirements too.
    pub transitive: bool,
    /// Allow building distributions from source.
    pub build: bool,
    /// Allow using pre-built wheels.
    pub use_wheel: bool,
    pub prefer_older_binary: bool,
    pub use_pep517: Option<bool>,
    pub build_isolation: bool,
    /// Keep the pip log around after the download, if one is written.
    pub preserve_log: bool,
}

impl DownloadRequest {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            requirements: Vec::new(),
            requirement_files: Vec::new(),
            constraint_files: Vec::new(),
            allow_prereleases: false,
            transitive: true,
            build: true,
            use_wheel: true,
            prefer_older_binary: false,
            use_pep517: None,
            build_isolation: true,
            preserve_log: false,
        }
    }
}

/// The options of a `pip wheel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildWheelsRequest {
    pub distributions: Vec<String>,
    pub wheel_dir: PathBuf,
    pub prefer_older_binary: bool,
    pub use_pep517: Option<bool>,
    pub build_isolation: bool,
    pub verify: bool,
}

impl BuildWheelsRequest {
    pub fn new(distributions: Vec<String>, wheel_dir: impl Into<PathBuf>) -> Self {
        Self {
            distributions,
            wheel_dir: wheel_dir.into(),
            prefer_older_binary: false,
            use_pep517: None,
            build_isolation: true,
            verify: true,
        }
    }
}

/// The options of a `pip install` of a single wheel into a prefix.
pub struct InstallWheelRequest {
    pub wheel: PathBuf,
    pub install_dir: PathBuf,
    pub compile: bool,
    /// Post-processing of the installed wheel, e.g., fixing up its `RECORD`.
    pub finalizer: Option<Finalizer>,
}

impl InstallWheelRequest {
    pub fn new(wheel: impl Into<PathBuf>, install_dir: impl Into<PathBuf>) -> Self {
        Self {
            wheel: wheel.into(),
            install_dir: install_dir.into(),
            compile: false,
            finalizer: None,
        }
    }
}

impl std::fmt::Debug for InstallWheelRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallWheelRequest")
            .field("wheel", &self.wheel)
            .field("install_dir", &self.install_dir)
            .field("compile", &self.compile)
            .field("finalizer", &self.finalizer.is_some())
            .finish()
    }
}

/// A running pip invocation.
///
/// Any runtime patches emitted for the invocation live as long as the job.
#[derive(Debug)]
pub struct PipJob {
    kind: PipJobKind,
    patches: Option<EmittedPatches>,
}

#[derive(Debug)]
enum PipJobKind {
    Plain(Job),
    Scrape(LogScrapeJob),
}

impl PipJob {
    pub fn command(&self) -> &str {
        match &self.kind {
            PipJobKind::Plain(job) => job.command(),
            PipJobKind::Scrape(job) => job.command(),
        }
    }

    /// The pip log, if one is being analyzed.
    pub fn log(&self) -> Option<&Path> {
        match &self.kind {
            PipJobKind::Plain(_) => None,
            PipJobKind::Scrape(job) => Some(job.log().path()),
        }
    }

    pub async fn kill(&mut self) -> io::Result<()> {
        match &mut self.kind {
            PipJobKind::Plain(job) => job.kill().await,
            PipJobKind::Scrape(job) => job.kill().await,
        }
    }

    /// Wait for pip to exit and run the job's finalizer, if any.
    pub async fn wait(self) -> Result<(), piper_job::Error> {
        let Self { kind, patches } = self;
        let result = match kind {
            PipJobKind::Plain(job) => job.wait().await,
            PipJobKind::Scrape(job) => job.wait().await,
        };
        drop(patches);
        result
    }
}

/// The options shared by every pip invocation.
#[derive(Debug)]
struct PipCommand<'a> {
    /// The subcommand and its arguments, preceded by any global options it needs.
    args: Vec<OsString>,
    index_configuration: Option<&'a PackageIndexConfiguration>,
    /// The major version of the interpreter pip runs under.
    python_major: u8,
    /// A quiet verbosity defers to `PIPER_VERBOSE`.
    verbosity: PipVerbosity,
    extra_env: BTreeMap<OsString, OsString>,
}

impl<'a> PipCommand<'a> {
    fn new(args: Vec<OsString>, python_major: u8) -> Self {
        Self {
            args,
            index_configuration: None,
            python_major,
            verbosity: PipVerbosity::default(),
            extra_env: BTreeMap::new(),
        }
    }

    #[must_use]
    fn with_index_configuration(
        mut self,
        index_configuration: Option<&'a PackageIndexConfiguration>,
    ) -> Self {
        self.index_configuration = index_configuration;
        self
    }
}

/// A `pip download`, ready to spawn.
struct Download {
    invocation: Invocation,
    log: Option<ScrapeLog>,
    analyzers: Vec<Box<dyn ErrorAnalyzer>>,
    patches: Option<EmittedPatches>,
}

/// Runs pip from a [`PipVenv`], with its caches in a piper-managed directory.
#[derive(Debug, Clone)]
pub struct Pip {
    venv: PipVenv,
    cache: PathBuf,
    env: AmbientEnv,
}

impl Pip {
    pub fn new(venv: PipVenv, cache: impl Into<PathBuf>, env: AmbientEnv) -> Self {
        Self {
            venv,
            cache: cache.into(),
            env,
        }
    }

    pub fn venv(&self) -> &PipVenv {
        &self.venv
    }

    pub fn cache(&self) -> &Path {
        &self.cache
    }

    /// Download the distributions satisfying a set of requirements for a target.
    ///
    /// With the 2020 resolver, or an observer with an analyzer, pip's log is analyzed to explain
    /// failures; with `PIPER_VERBOSE` set, the resolver's backtracking progress is forwarded to
    /// stderr as well.
    #[instrument(name = "spawn_download", skip_all, fields(dest = %request.download_dir.display()))]
    pub fn spawn_download_distributions(
        &self,
        request: &DownloadRequest,
        target: &Target,
        index_configuration: Option<&PackageIndexConfiguration>,
        observer: Option<DownloadObserver>,
    ) -> Result<PipJob, Error> {
        let Download {
            invocation,
            log,
            analyzers,
            patches,
        } = self.prepare_download(request, target, index_configuration, observer)?;

        let kind = if let Some(log) = log {
            // `pip -q --log <file>` leaks progress bars to stdout.
            let job = Job::spawn(&invocation, Stdout::Null, None)?;
            let forward = (self.env.piper_verbosity() > 0)
                .then(|| Forward::new(BACKTRACKING.clone(), WriterSink::stderr()));
            PipJobKind::Scrape(LogScrapeJob::start(job, log, analyzers, forward))
        } else {
            PipJobKind::Plain(Job::spawn(&invocation, Stdout::Stderr, None)?)
        };
        Ok(PipJob { kind, patches })
    }

    fn prepare_download(
        &self,
        request: &DownloadRequest,
        target: &Target,
        index_configuration: Option<&PackageIndexConfiguration>,
        observer: Option<DownloadObserver>,
    ) -> Result<Download, Error> {
        if !request.use_wheel {
            if !request.build {
                return Err(ConfigurationError::NoWheelsNoBuild.into());
            }
            if let Some(platform) = target.platform() {
                return Err(ConfigurationError::NoWheelsForeignPlatform(platform.clone()).into());
            }
        }

        let mut args = vec![
            OsString::from("download"),
            OsString::from("--dest"),
            request.download_dir.clone().into_os_string(),
        ];
        let mut extra_env = BTreeMap::new();
        if !request.build {
            args.extend(["--only-binary".into(), ":all:".into()]);
        }
        if !request.use_wheel {
            args.extend(["--no-binary".into(), ":all:".into()]);
        }
        if request.prefer_older_binary {
            args.push("--prefer-binary".into());
        }
        if let Some(use_pep517) = request.use_pep517 {
            args.push(pep517_flag(use_pep517));
        }
        if !request.build_isolation {
            args.push("--no-build-isolation".into());
            extra_env.insert(
                EnvVars::PEP517_BACKEND_PATH.into(),
                backend_path(target.interpreter())?,
            );
        }
        if request.allow_prereleases {
            args.push("--pre".into());
        }
        if !request.transitive {
            args.push("--no-deps".into());
        }
        for requirement_file in &request.requirement_files {
            args.extend(["--requirement".into(), requirement_file.into()]);
        }
        for constraint_file in &request.constraint_files {
            args.extend(["--constraint".into(), constraint_file.into()]);
        }
        args.extend(request.requirements.iter().map(OsString::from));

        let mut analyzers: Vec<Box<dyn ErrorAnalyzer>> = Vec::new();
        let mut contributions = Vec::new();
        if let Target::Foreign { supported_tags, .. } = target {
            contributions.push(tags_patch(supported_tags)?);
        }
        if let Some(observer) = observer {
            let (analyzer, patches) = observer.into_parts();
            analyzers.extend(analyzer);
            contributions.extend(patches);
        }
        let patch_set = PatchSet::compose(contributions).map_err(ConfigurationError::from)?;

        // The 2020 resolver only explains conflicts in its log.
        let resolver_version = index_configuration
            .map(PackageIndexConfiguration::resolver_version)
            .unwrap_or_default();
        if resolver_version == ResolverVersion::Pip2020 {
            analyzers.push(Box::new(ResolutionImpossibleAnalyzer::new()));
        }

        let patches = emit_patches(&patch_set, &mut extra_env)?;

        let log = if analyzers.is_empty() {
            if request.preserve_log {
                warn_user!(
                    "The `pip download` log is not being analyzed, so there's no log to preserve"
                );
            }
            None
        } else {
            let log = ScrapeLog::create(request.preserve_log).map_err(Error::Log)?;
            args.splice(
                0..0,
                [OsString::from("--log"), log.path().as_os_str().to_owned()],
            );
            Some(log)
        };

        let mut command = PipCommand::new(args, target.interpreter().major())
            .with_index_configuration(index_configuration);
        command.extra_env = extra_env;
        let invocation = self.invocation(command)?;

        Ok(Download {
            invocation,
            log,
            analyzers,
            patches,
        })
    }

    /// Build wheels for the given distributions, without their dependencies.
    #[instrument(skip_all, fields(wheel_dir = %request.wheel_dir.display()))]
    pub fn spawn_build_wheels(
        &self,
        request: &BuildWheelsRequest,
        interpreter: &Interpreter,
        index_configuration: Option<&PackageIndexConfiguration>,
    ) -> Result<Job, Error> {
        let invocation = self.build_wheels_invocation(request, interpreter, index_configuration)?;
        Ok(Job::spawn(&invocation, Stdout::Stderr, None)?)
    }

    fn build_wheels_invocation(
        &self,
        request: &BuildWheelsRequest,
        interpreter: &Interpreter,
        index_configuration: Option<&PackageIndexConfiguration>,
    ) -> Result<Invocation, Error> {
        let mut args = vec![
            OsString::from("wheel"),
            OsString::from("--no-deps"),
            OsString::from("--wheel-dir"),
            request.wheel_dir.clone().into_os_string(),
        ];
        let mut extra_env = BTreeMap::new();

        // PEP 517 builds may need to resolve build requirements.
        if request.use_pep517 != Some(false) && request.prefer_older_binary {
            args.push("--prefer-binary".into());
        }
        if let Some(use_pep517) = request.use_pep517 {
            args.push(pep517_flag(use_pep517));
        }
        if !request.build_isolation {
            args.push("--no-build-isolation".into());
            extra_env.insert(
                EnvVars::PEP517_BACKEND_PATH.into(),
                backend_path(interpreter)?,
            );
        }
        if !request.verify {
            args.push("--no-verify".into());
        }
        args.extend(request.distributions.iter().map(OsString::from));

        let mut command = PipCommand::new(args, interpreter.major())
            .with_index_configuration(index_configuration);
        command.extra_env = extra_env;
        self.invocation(command)
    }

    /// Install a single wheel into a prefix directory, for whatever platform it targets.
    ///
    /// The request's finalizer runs after pip exits, whether or not it succeeded.
    #[instrument(skip_all, fields(wheel = %request.wheel.display()))]
    pub fn spawn_install_wheel(
        &self,
        request: InstallWheelRequest,
        target: &Target,
    ) -> Result<PipJob, Error> {
        let InstallWheelRequest {
            wheel,
            install_dir,
            compile,
            finalizer,
        } = request;
        let (invocation, patches) =
            self.install_wheel_invocation(&wheel, &install_dir, compile, target)?;
        let job = Job::spawn(&invocation, Stdout::Stderr, finalizer)?;
        Ok(PipJob {
            kind: PipJobKind::Plain(job),
            patches,
        })
    }

    fn install_wheel_invocation(
        &self,
        wheel: &Path,
        install_dir: &Path,
        compile: bool,
        target: &Target,
    ) -> Result<(Invocation, Option<EmittedPatches>), Error> {
        if compile {
            if let Some(platform) = target.platform() {
                return Err(ConfigurationError::CompileForeignPlatform {
                    wheel: wheel.to_path_buf(),
                    platform: platform.clone(),
                }
                .into());
            }
        }

        let mut args = [
            "install",
            "--no-deps",
            "--no-index",
            "--only-binary",
            ":all:",
            // Scripts are relocated later; don't warn that the prefix isn't on `PATH`.
            "--no-warn-script-location",
            // pip, setuptools and wheel are already importable by pip itself, which would
            // otherwise skip them as satisfied.
            "--force-reinstall",
            "--ignore-installed",
            // The wheel is only unpacked, so the interpreter running pip needn't match it.
            "--ignore-requires-python",
            "--prefix",
        ]
        .into_iter()
        .map(OsString::from)
        .collect::<Vec<_>>();
        args.push(install_dir.as_os_str().to_owned());
        args.push(if compile { "--compile" } else { "--no-compile" }.into());
        args.push(wheel.as_os_str().to_owned());

        // In the `--prefix` scheme, pip refuses wheels it deems incompatible with its own
        // interpreter, so the wheel's own tags are made compatible.
        let interpreter = target.interpreter();
        let mut compatible_tags =
            CompatibilityTags::from_wheel(wheel).map_err(ConfigurationError::from)?;
        compatible_tags.extend(interpreter.supported_tags().iter().cloned());
        let patch_set =
            PatchSet::compose([tags_patch(&compatible_tags)?]).map_err(ConfigurationError::from)?;

        let mut extra_env = BTreeMap::new();
        let patches = emit_patches(&patch_set, &mut extra_env)?;

        let mut command = PipCommand::new(args, interpreter.major());
        command.extra_env = extra_env;
        Ok((self.invocation(command)?, patches))
    }

    /// Run `pip debug` for a platform, capturing its report on stdout.
    ///
    /// pip warns that the output of `debug` isn't stable; stderr is only shown if it fails.
    #[instrument(skip_all, fields(platform = %platform))]
    pub fn spawn_debug(&self, platform: &Platform, manylinux: Option<&str>) -> Result<Job, Error> {
        let invocation = self.debug_invocation(platform, manylinux)?;
        Ok(Job::spawn(&invocation, Stdout::Capture, None)?)
    }

    fn debug_invocation(
        &self,
        platform: &Platform,
        manylinux: Option<&str>,
    ) -> Result<Invocation, Error> {
        let mut args = vec![OsString::from("debug")];
        args.extend(platform.debug_args(manylinux).into_iter().map(OsString::from));
        let mut command = PipCommand::new(args, self.venv.interpreter().major());
        command.verbosity = PipVerbosity::new(1);
        self.invocation(command)
    }

    /// The compatibility tags pip reports for a platform.
    pub async fn supported_tags(
        &self,
        platform: &Platform,
        manylinux: Option<&str>,
    ) -> Result<CompatibilityTags, Error> {
        let stdout = self.spawn_debug(platform, manylinux)?.output().await?;
        CompatibilityTags::from_pip_debug(&String::from_utf8_lossy(&stdout)).map_err(Error::Debug)
    }

    /// Assemble the full pip command line and environment.
    ///
    /// The only side effect is creating pip's temporary directory in the cache.
    fn invocation(&self, command: PipCommand<'_>) -> Result<Invocation, Error> {
        let PipCommand {
            args: command_args,
            index_configuration,
            python_major,
            verbosity,
            extra_env,
        } = command;

        let mut args = [
            // pip is provisioned by piper, so it should never check for updates.
            "--disable-pip-version-check",
            "--no-python-version-warning",
            // A path collision should never happen; abort rather than prompt if it does.
            "--exists-action",
            "a",
            "--no-input",
        ]
        .into_iter()
        .map(OsString::from)
        .collect::<Vec<_>>();

        let resolver_version = index_configuration
            .map(PackageIndexConfiguration::resolver_version)
            .unwrap_or_default();
        args.extend(
            resolver_version
                .args(python_major)
                .iter()
                .map(OsString::from),
        );

        // Ignore pip configuration files and `PIP_*` environment variables.
        if index_configuration.is_none_or(PackageIndexConfiguration::isolated) {
            args.push("--isolated".into());
        }

        let piper_verbosity = self.env.piper_verbosity();
        let verbosity = if verbosity.is_quiet() {
            PipVerbosity::from_piper_verbosity(piper_verbosity)
        } else {
            verbosity
        };
        args.push(verbosity.flag().into());
        args.extend(["--cache-dir".into(), self.cache.clone().into_os_string()]);

        args.extend(command_args);

        // Index options are subcommand options, so they follow the subcommand.
        if let Some(index_configuration) = index_configuration {
            args.extend(index_configuration.args().iter().map(OsString::from));
        }

        let mut env = self.env.scrubbed();
        env.insert(
            EnvVars::PIPER_VERBOSE.into(),
            piper_verbosity.to_string().into(),
        );
        if let Some(index_configuration) = index_configuration {
            env.extend(
                index_configuration
                    .env()
                    .iter()
                    .map(|(key, value)| (OsString::from(key), value.clone())),
            );
        }
        env.extend(extra_env);

        // Keep pip's temporary files on the same filesystem as its cache, so moves between the
        // two are atomic renames.
        let tmpdir = self.cache.join(".tmp");
        fs_err::create_dir_all(&tmpdir)?;
        env.insert(EnvVars::TMPDIR.into(), tmpdir.into_os_string());

        Ok(Invocation::new(
            self.venv.interpreter().python(),
            self.venv.execute_args(args),
            env,
        ))
    }
}

fn pep517_flag(use_pep517: bool) -> OsString {
    if use_pep517 {
        "--use-pep517".into()
    } else {
        "--no-use-pep517".into()
    }
}

fn backend_path(interpreter: &Interpreter) -> Result<OsString, ConfigurationError> {
    std::env::join_paths(interpreter.sys_path())
        .map_err(|err| ConfigurationError::SearchPath(EnvVars::PEP517_BACKEND_PATH, err))
}

/// Emit the patch package, if any, adding the environment pointing pip at it to `env`.
fn emit_patches(
    patch_set: &PatchSet,
    env: &mut BTreeMap<OsString, OsString>,
) -> Result<Option<EmittedPatches>, Error> {
    env.extend(
        patch_set
            .env()
            .iter()
            .map(|(key, value)| (OsString::from(key), value.clone())),
    );
    let patches = patch_set.emit(PATCHES_PACKAGE).map_err(Error::Patches)?;
    if let Some(patches) = &patches {
        debug!(
            "Patching pip with {}",
            patch_set.targets().collect::<Vec<_>>().join(", ")
        );
        env.extend(
            patches
                .env()
                .into_iter()
                .map(|(key, value)| (OsString::from(key), value.to_owned())),
        );
    }
    Ok(patches)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::str::FromStr;

    use piper_configuration::{
        IndexLocations, NetworkConfiguration, PackageIndexConfiguration, ResolverVersion,
    };
    use piper_job::Invocation;
    use piper_patches::PatchContribution;

    use super::{BuildWheelsRequest, Download, DownloadRequest, InstallWheelRequest, Pip, PipVenv};
    use crate::{
        AmbientEnv, CompatibilityTags, ConfigurationError, DownloadObserver, Error, Interpreter,
        Platform, TAGS_PATCH_TARGET, Tag, Target,
    };

    fn interpreter() -> Interpreter {
        Interpreter::new("/usr/bin/python3", 3, 11)
            .with_sys_path([
                PathBuf::from("/usr/lib/python3.11"),
                PathBuf::from("/usr/lib/python3.11/site-packages"),
            ])
            .with_supported_tags(CompatibilityTags::new([
                Tag::from_str("cp311-cp311-linux_x86_64").unwrap()
            ]))
    }

    fn pip(cache: &Path, env: AmbientEnv) -> Pip {
        Pip::new(
            PipVenv::new("/venvs/pip", interpreter(), ["-m", "pip"]),
            cache,
            env,
        )
    }

    fn foreign() -> Target {
        Target::Foreign {
            platform: Platform::from_str("macosx_11_0_arm64-cp-311-cp311").unwrap(),
            interpreter: interpreter(),
            supported_tags: CompatibilityTags::new([
                Tag::from_str("cp311-cp311-macosx_11_0_arm64").unwrap()
            ]),
        }
    }

    /// Render the command line with the temporary paths in it replaced.
    fn render(invocation: &Invocation, cache: &Path, log: Option<&Path>) -> String {
        let mut command = invocation.render_command();
        if let Some(log) = log {
            command = command.replace(log.to_str().unwrap(), "[LOG]");
        }
        command.replace(cache.to_str().unwrap(), "[CACHE]")
    }

    fn env_var(invocation: &Invocation, key: &str) -> Option<String> {
        invocation
            .env()
            .get(std::ffi::OsStr::new(key))
            .map(|value| value.to_string_lossy().into_owned())
    }

    #[test]
    fn download_invocation() {
        let cache = tempfile::tempdir().unwrap();
        let pip = pip(
            cache.path(),
            AmbientEnv::from_iter([
                ("HOME", "/home/piper"),
                ("PIPER_VERBOSE", "4"),
                ("PYTHONPATH", "/site"),
            ]),
        );
        let request = DownloadRequest {
            requirements: vec!["requests==2.31.0".to_string()],
            transitive: false,
            prefer_older_binary: true,
            ..DownloadRequest::new("/dist")
        };
        let index_configuration = PackageIndexConfiguration::create(
            IndexLocations {
                indexes: Some(vec![
                    "https://pypi.org/simple".to_string(),
                    "http://mirror.example.com:8080/simple".to_string(),
                ]),
                find_links: Vec::new(),
            },
            NetworkConfiguration {
                proxy: Some("http://proxy.example.com:3128".to_string()),
                ..NetworkConfiguration::default()
            },
            ResolverVersion::Pip2020,
        );

        let Download {
            invocation,
            log,
            analyzers,
            patches,
        } = pip
            .prepare_download(
                &request,
                &Target::Local(interpreter()),
                Some(&index_configuration),
                None,
            )
            .unwrap();

        // The 2020 resolver's conflicts are analyzed from the log.
        let log = log.unwrap();
        assert_eq!(analyzers.len(), 1);
        assert!(patches.is_none());
        insta::assert_snapshot!(
            render(&invocation, cache.path(), Some(log.path())),
            @"/usr/bin/python3 -m pip --disable-pip-version-check --no-python-version-warning --exists-action a --no-input --isolated -v --cache-dir [CACHE] --log [LOG] download --dest /dist --prefer-binary --no-deps requests==2.31.0 --index-url https://pypi.org/simple --extra-index-url http://mirror.example.com:8080/simple --trusted-host mirror.example.com:8080 --retries 5 --timeout 15"
        );

        let keys = invocation
            .env()
            .keys()
            .map(|key| key.to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(
            keys,
            ["HOME", "PIPER_VERBOSE", "TMPDIR", "http_proxy", "https_proxy"]
        );
        assert_eq!(env_var(&invocation, "PIPER_VERBOSE").as_deref(), Some("4"));
        let tmpdir = cache.path().join(".tmp");
        assert_eq!(
            env_var(&invocation, "TMPDIR").as_deref(),
            tmpdir.to_str()
        );
        assert!(tmpdir.is_dir());
    }

    #[test]
    fn download_legacy_resolver() {
        let cache = tempfile::tempdir().unwrap();
        let pip = pip(cache.path(), AmbientEnv::default());
        let request = DownloadRequest {
            requirements: vec!["six".to_string()],
            requirement_files: vec![PathBuf::from("requirements.txt")],
            constraint_files: vec![PathBuf::from("constraints.txt")],
            use_pep517: Some(false),
            build_isolation: false,
            allow_prereleases: true,
            preserve_log: true,
            ..DownloadRequest::new("/dist")
        };
        let index_configuration = PackageIndexConfiguration::create(
            IndexLocations::offline(vec!["/wheels".to_string()]),
            NetworkConfiguration::default(),
            ResolverVersion::PipLegacy,
        );

        let download = pip
            .prepare_download(
                &request,
                &Target::Local(interpreter()),
                Some(&index_configuration),
                None,
            )
            .unwrap();

        // Nothing to analyze, so no log.
        assert!(download.log.is_none());
        assert!(download.analyzers.is_empty());
        insta::assert_snapshot!(
            render(&download.invocation, cache.path(), None),
            @"/usr/bin/python3 -m pip --disable-pip-version-check --no-python-version-warning --exists-action a --no-input --use-deprecated legacy-resolver --isolated -q --cache-dir [CACHE] download --dest /dist --no-use-pep517 --no-build-isolation --pre --requirement requirements.txt --constraint constraints.txt six --no-index --find-links /wheels --retries 5 --timeout 15"
        );
        if cfg!(unix) {
            assert_eq!(
                env_var(&download.invocation, "PEP517_BACKEND_PATH").as_deref(),
                Some("/usr/lib/python3.11:/usr/lib/python3.11/site-packages")
            );
        }
    }

    #[test]
    fn download_foreign_platform() {
        let cache = tempfile::tempdir().unwrap();
        let pip = pip(cache.path(), AmbientEnv::default());
        let observer = DownloadObserver::default()
            .with_patch(PatchContribution::new("pip._internal.network.session").with_module(
                "patch_session",
                "pass\n",
            ));

        let download = pip
            .prepare_download(
                &DownloadRequest::new("/dist"),
                &foreign(),
                None,
                Some(observer),
            )
            .unwrap();

        let patches = download.patches.unwrap();
        let package = patches.sys_path().join("_piper_pip_patches");
        assert!(package.join("patch_tags.py").is_file());
        assert!(package.join("patch_session.py").is_file());
        assert_eq!(
            env_var(&download.invocation, "_PIPER_PATCHED_TAGS").as_deref(),
            Some(r#"["cp311-cp311-macosx_11_0_arm64"]"#)
        );
        assert_eq!(
            env_var(&download.invocation, "PIPER_EXTRA_SYS_PATH").as_deref(),
            patches.sys_path().to_str()
        );
        assert_eq!(
            env_var(&download.invocation, "_PIPER_PIP_RUNTIME_PATCHES_PACKAGE").as_deref(),
            Some("_piper_pip_patches")
        );
    }

    #[test]
    fn configuration_errors() {
        let cache = tempfile::tempdir().unwrap();
        let pip = pip(cache.path(), AmbientEnv::default());

        let request = DownloadRequest {
            build: false,
            use_wheel: false,
            ..DownloadRequest::new("/dist")
        };
        let err = pip
            .spawn_download_distributions(&request, &Target::Local(interpreter()), None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::NoWheelsNoBuild)
        ));

        let request = DownloadRequest {
            use_wheel: false,
            ..DownloadRequest::new("/dist")
        };
        let err = pip
            .spawn_download_distributions(&request, &foreign(), None, None)
            .unwrap_err();
        insta::assert_snapshot!(err, @"Cannot ignore wheels (`use_wheel = false`) when resolving for a foreign platform: macosx_11_0_arm64-cp-311-cp311");

        // The foreign platform patch already patches the supported tags.
        let observer =
            DownloadObserver::default().with_patch(PatchContribution::new(TAGS_PATCH_TARGET));
        let err = pip
            .spawn_download_distributions(
                &DownloadRequest::new("/dist"),
                &foreign(),
                None,
                Some(observer),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::Patches(_))
        ));

        let mut request =
            InstallWheelRequest::new("/wheels/six-1.16.0-py2.py3-none-any.whl", "/install");
        request.compile = true;
        let err = pip.spawn_install_wheel(request, &foreign()).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::CompileForeignPlatform { .. })
        ));

        // Nothing was prepared for a pip run.
        assert!(!cache.path().join(".tmp").exists());
    }

    #[test]
    fn build_wheels_invocation() {
        let cache = tempfile::tempdir().unwrap();
        let pip = pip(cache.path(), AmbientEnv::default());
        let request = BuildWheelsRequest {
            prefer_older_binary: true,
            verify: false,
            ..BuildWheelsRequest::new(vec!["/sdists/six-1.16.0.tar.gz".to_string()], "/wheels")
        };
        let invocation = pip
            .build_wheels_invocation(&request, &interpreter(), None)
            .unwrap();
        insta::assert_snapshot!(
            render(&invocation, cache.path(), None),
            @"/usr/bin/python3 -m pip --disable-pip-version-check --no-python-version-warning --exists-action a --no-input --isolated -q --cache-dir [CACHE] wheel --no-deps --wheel-dir /wheels --prefer-binary --no-verify /sdists/six-1.16.0.tar.gz"
        );

        // Without PEP 517, there are no build requirements to prefer binaries for.
        let request = BuildWheelsRequest {
            use_pep517: Some(false),
            ..request
        };
        let invocation = pip
            .build_wheels_invocation(&request, &interpreter(), None)
            .unwrap();
        assert!(
            !invocation
                .args()
                .iter()
                .any(|arg| arg.as_os_str() == "--prefer-binary")
        );
    }

    #[test]
    fn install_wheel_invocation() {
        let cache = tempfile::tempdir().unwrap();
        let pip = pip(cache.path(), AmbientEnv::default());
        let (invocation, patches) = pip
            .install_wheel_invocation(
                Path::new("/wheels/six-1.16.0-py2.py3-none-any.whl"),
                Path::new("/install"),
                false,
                &Target::Local(interpreter()),
            )
            .unwrap();
        insta::assert_snapshot!(
            render(&invocation, cache.path(), None),
            @"/usr/bin/python3 -m pip --disable-pip-version-check --no-python-version-warning --exists-action a --no-input --isolated -q --cache-dir [CACHE] install --no-deps --no-index --only-binary :all: --no-warn-script-location --force-reinstall --ignore-installed --ignore-requires-python --prefix /install --no-compile /wheels/six-1.16.0-py2.py3-none-any.whl"
        );
        assert!(patches.is_some());
        assert_eq!(
            env_var(&invocation, "_PIPER_PATCHED_TAGS").as_deref(),
            Some(r#"["py2-none-any","py3-none-any","cp311-cp311-linux_x86_64"]"#)
        );
    }

    #[test]
    fn debug_invocation() {
        let cache = tempfile::tempdir().unwrap();
        let pip = pip(cache.path(), AmbientEnv::from_iter([("PIPER_VERBOSE", "9")]));
        let platform = Platform::from_str("linux_x86_64-cp-311-cp311").unwrap();
        let invocation = pip
            .debug_invocation(&platform, Some("manylinux2014"))
            .unwrap();
        // `debug` always runs at `-v`, regardless of `PIPER_VERBOSE`.
        insta::assert_snapshot!(
            render(&invocation, cache.path(), None),
            @"/usr/bin/python3 -m pip --disable-pip-version-check --no-python-version-warning --exists-action a --no-input --isolated -v --cache-dir [CACHE] debug --platform manylinux2014_x86_64 --platform linux_x86_64 --implementation cp --python-version 311 --abi cp311"
        );
    }
}

/// Run a shell script standing in for pip.
#[cfg(all(test, unix))]
mod process_tests {
    use std::path::PathBuf;
    use std::process::ExitStatus;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use piper_job::Error;

    use super::{DownloadRequest, InstallWheelRequest, Pip, PipVenv};
    use crate::{AmbientEnv, Interpreter, Target};

    /// A `pip` that runs `script` with the pip arguments as `$@`.
    fn fake_pip(cache: &std::path::Path, script: &str) -> (Pip, Target) {
        let interpreter = Interpreter::new("/bin/sh", 3, 11);
        let pip = Pip::new(
            PipVenv::new("/venvs/pip", interpreter.clone(), ["-c", script, "pip"]),
            cache,
            AmbientEnv::default(),
        );
        (pip, Target::Local(interpreter))
    }

    #[tokio::test]
    async fn download_conflict() {
        let cache = tempfile::tempdir().unwrap();
        let (pip, target) = fake_pip(
            cache.path(),
            r#"
            while [ $# -gt 0 ]; do
                if [ "$1" = --log ]; then log="$2"; fi
                shift
            done
            {
                echo "T1 Collecting a"
                echo "T1 ERROR: Cannot install a and b because these package versions have conflicting dependencies."
                echo "T1 The conflict is caused by:"
                echo "T1     a depends on c==1"
                echo "T1 ERROR: ResolutionImpossible: for help visit https://pip.pypa.io"
            } >> "$log"
            echo "ERROR: ResolutionImpossible" >&2
            exit 1
            "#,
        );

        let job = pip
            .spawn_download_distributions(&DownloadRequest::new("/dist"), &target, None, None)
            .unwrap();
        let log = job.log().map(PathBuf::from).unwrap();
        let err = job.wait().await.unwrap_err();
        let Error::Analyzed(failure) = &err else {
            panic!("Expected an analyzed failure, got: {err:?}");
        };
        assert_eq!(
            failure.messages(),
            ["The conflict is caused by:", "    a depends on c==1"]
        );
        assert!(!log.exists());
    }

    #[tokio::test]
    async fn install_wheel_patched() {
        let cache = tempfile::tempdir().unwrap();
        let (pip, target) = fake_pip(
            cache.path(),
            r#"
            test -f "$PIPER_EXTRA_SYS_PATH/$_PIPER_PIP_RUNTIME_PATCHES_PACKAGE/patch_tags.py" || exit 7
            test -n "$_PIPER_PATCHED_TAGS" || exit 8
            "#,
        );

        let finalized = Arc::new(AtomicBool::new(false));
        let mut request = InstallWheelRequest::new(
            "/wheels/six-1.16.0-py2.py3-none-any.whl",
            cache.path().join("install"),
        );
        request.finalizer = Some({
            let finalized = finalized.clone();
            Box::new(move |status: ExitStatus| -> anyhow::Result<()> {
                assert!(status.success());
                finalized.store(true, Ordering::SeqCst);
                Ok(())
            })
        });

        let job = pip.spawn_install_wheel(request, &target).unwrap();
        job.wait().await.unwrap();
        assert!(finalized.load(Ordering::SeqCst));
    }
}
