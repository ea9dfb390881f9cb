//! Turn the free-form log of a subprocess into structured error messages.
//!
//! An [`ErrorAnalyzer`] sees every line of the log, in order, until it reports that it's
//! [`ErrorAnalysis::Complete`]. A [`LogScrapeJob`] runs a set of analyzers over the log of a
//! [`piper_job::Job`] while it runs and uses what they found to explain a failure.

pub use analyzer::{ErrorAnalysis, ErrorAnalyzer, ErrorMessage};
pub use resolution::ResolutionImpossibleAnalyzer;
pub use scrape::{Forward, LogScrapeJob, ScrapeLog};

mod analyzer;
mod resolution;
mod scrape;
