//! Logging setup shared by the relay and the client binaries.
//!
//! `RUST_LOG` wins when set; otherwise each binary passes directives built
//! from its configured level. Output always goes to stderr so the client's
//! prompt and listings on stdout stay clean.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// `target=level` directives for each crate a binary logs from.
pub fn directives(targets: &[&str], level: &str) -> String {
    targets
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_filter(filter: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|e| Error::LogFilter {
        filter: filter.to_string(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber. `log_json` switches to one JSON object
/// per event.
pub fn init_tracing(default_filter: &str, log_json: bool) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(from_env) if !from_env.trim().is_empty() => parse_filter(&from_env)?,
        _ => parse_filter(default_filter)?,
    };
    let fmt = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if log_json {
        registry.with(fmt.json()).try_init()
    } else {
        registry.with(fmt).try_init()
    };
    installed.map_err(|e| Error::TracingInstalled(e.to_string()))
}
