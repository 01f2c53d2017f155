//! Logging sink construction.
//!
//! The library never installs a global subscriber. Instead a
//! [`tracing::Dispatch`] is built here (or by the embedding application) and
//! injected into [`crate::Client`], which attaches it to every future it runs.

use serde::Deserialize;
use tracing::Dispatch;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;

/// Output format of the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable single-line events.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Builds a sink writing to stderr.
///
/// `verbose` selects debug instead of info as the default level; `RUST_LOG`
/// directives still take precedence.
pub fn sink(verbose: bool, format: LogFormat) -> Dispatch {
    sink_with_writer(verbose, format, std::io::stderr)
}

/// Like [`sink`], with a caller-supplied writer.
pub fn sink_with_writer<W>(verbose: bool, format: LogFormat, writer: W) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    match format {
        LogFormat::Text => Dispatch::new(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(writer)),
        ),
        LogFormat::Json => Dispatch::new(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(writer)),
        ),
    }
}
