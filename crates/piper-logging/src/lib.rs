use std::fmt;
use std::io::IsTerminal;
use std::str::FromStr;

use anstream::ColorChoice;
use anyhow::Context;
use jiff::Timestamp;
use owo_colors::OwoColorize;
use tracing::level_filters::LevelFilter;
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};
use tracing_tree::HierarchicalLayer;
use tracing_tree::time::Uptime;

use piper_static::EnvVars;

/// How much of piper's own tracing output reaches stderr.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// No output unless `RUST_LOG` asks for it.
    #[default]
    Default,
    /// `piper=debug`: the command line of every pip invocation and the jobs it runs in.
    Verbose,
    /// `piper=trace` as a span tree: also the complete environment of every pip invocation.
    ExtraVerbose,
}

impl Level {
    /// Map a `PIPER_VERBOSE` value to a level.
    ///
    /// Trace output starts at `3`, the same level at which pip itself stops running quietly.
    pub fn from_verbosity(verbosity: u8) -> Self {
        match verbosity {
            0 => Self::Default,
            1 | 2 => Self::Verbose,
            _ => Self::ExtraVerbose,
        }
    }

    fn directive(self) -> Result<Directive, ParseError> {
        match self {
            Self::Default => Ok(LevelFilter::OFF.into()),
            Self::Verbose => Directive::from_str("piper=debug"),
            Self::ExtraVerbose => Directive::from_str("piper=trace"),
        }
    }
}

/// Renders one event per line: an optional timestamp, the colored level, the chain of pip
/// job spans the event was recorded in, then the message.
#[derive(Debug, Clone, Copy, Default)]
pub struct PiperFormat {
    /// Prefix each line with the current time, to line it up with the timestamps in `pip.log`.
    pub timestamps: bool,
    /// Prefix each line with its enclosing spans, e.g. `spawn_download>tail:`.
    pub spans: bool,
}

impl PiperFormat {
    fn write_level(writer: &mut Writer<'_>, level: tracing::Level) -> fmt::Result {
        if !writer.has_ansi_escapes() {
            return write!(writer, "{level} ");
        }
        match level {
            tracing::Level::TRACE => write!(writer, "{} ", level.purple()),
            tracing::Level::DEBUG => write!(writer, "{} ", level.blue()),
            tracing::Level::INFO => write!(writer, "{} ", level.green()),
            tracing::Level::WARN => write!(writer, "{} ", level.yellow()),
            tracing::Level::ERROR => write!(writer, "{} ", level.red()),
        }
    }

    fn write_spans<S, N>(
        writer: &mut Writer<'_>,
        ctx: &FmtContext<'_, S, N>,
        event: &Event<'_>,
    ) -> fmt::Result
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
        N: for<'a> FormatFields<'a> + 'static,
    {
        let Some(leaf) = event
            .parent()
            .and_then(|id| ctx.span(id))
            .or_else(|| ctx.lookup_current())
        else {
            return Ok(());
        };
        let names = leaf
            .scope()
            .from_root()
            .map(|span| span.metadata().name())
            .collect::<Vec<_>>()
            .join(">");
        if writer.has_ansi_escapes() {
            write!(writer, "{}: ", names.bold())
        } else {
            write!(writer, "{names}: ")
        }
    }
}

impl<S, N> FormatEvent<S, N> for PiperFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        if self.timestamps {
            if writer.has_ansi_escapes() {
                write!(writer, "{} ", Timestamp::now().dimmed())?;
            } else {
                write!(writer, "{} ", Timestamp::now())?;
            }
        }
        Self::write_level(&mut writer, *event.metadata().level())?;
        if self.spans {
            Self::write_spans(&mut writer, ctx, event)?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install a global `tracing` subscriber writing to stderr.
///
/// `level` picks the default filter, which `RUST_LOG` overrides. When stderr is not a terminal,
/// lines carry timestamps.
pub fn setup_logging(level: Level) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.directive()?)
        .with_env_var(EnvVars::RUST_LOG)
        .from_env()
        .context("Invalid RUST_LOG directives")?;

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match level {
        Level::Default | Level::Verbose => {
            let ansi = matches!(
                anstream::Stderr::choice(&std::io::stderr()),
                ColorChoice::Always | ColorChoice::AlwaysAnsi
            );
            let format = PiperFormat {
                timestamps: !std::io::stderr().is_terminal(),
                spans: level == Level::Verbose,
            };
            tracing_subscriber::fmt::layer()
                .event_format(format)
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .boxed()
        }
        Level::ExtraVerbose => HierarchicalLayer::default()
            .with_targets(true)
            .with_timer(Uptime::default())
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .context("Failed to install the tracing subscriber")
}
