use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt::{Display, Formatter};

/// The literal command line and complete environment of a subprocess.
///
/// The environment is not inherited: the child sees exactly `env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    args: Vec<OsString>,
    env: BTreeMap<OsString, OsString>,
}

impl Invocation {
    /// Create an invocation of `program` with the given arguments and environment.
    pub fn new(
        program: impl Into<OsString>,
        args: impl IntoIterator<Item = impl Into<OsString>>,
        env: BTreeMap<OsString, OsString>,
    ) -> Self {
        let args = std::iter::once(program.into())
            .chain(args.into_iter().map(Into::into))
            .collect();
        Self { args, env }
    }

    pub fn program(&self) -> &OsStr {
        &self.args[0]
    }

    /// The arguments following the program.
    pub fn args(&self) -> &[OsString] {
        &self.args[1..]
    }

    pub fn env(&self) -> &BTreeMap<OsString, OsString> {
        &self.env
    }

    /// The command line, quoted for a POSIX shell.
    pub fn render_command(&self) -> String {
        self.args
            .iter()
            .map(|arg| shlex_quote(&arg.to_string_lossy()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The environment as `NAME=value` pairs, quoted for a POSIX shell.
    pub fn render_env(&self) -> String {
        self.env
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    key.to_string_lossy(),
                    shlex_quote(&value.to_string_lossy())
                )
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render_command())
    }
}

/// Quote a string, if necessary, for safe use in a POSIX-compatible shell command.
///
/// Like Python's `shlex.quote`: use single quotes, and put single quotes into double quotes, so
/// the string `$'b` is quoted as `'$'"'"'b'`.
pub fn shlex_quote(string: &str) -> Cow<'_, str> {
    let safe = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c);
    if !string.is_empty() && string.chars().all(safe) {
        Cow::Borrowed(string)
    } else {
        Cow::Owned(format!("'{}'", string.replace('\'', r#"'"'"'"#)))
    }
}
