//! Tracing subscriber setup for training runs
//!
//! The library itself only emits `tracing` events; binaries and demos call
//! [`init_logging`] once to decide where they go.

use std::io::{self, IsTerminal};

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::error::{Error, Result};

/// Default filter directive for a verbosity level
pub fn default_directive(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "trainkit=info,warn",
        1 => "trainkit=debug,info",
        2 => "trainkit=trace,debug",
        _ => "trace",
    }
}

/// Install a global tracing subscriber.
///
/// `RUST_LOG` wins over the verbosity-derived directive. Fails if a global
/// subscriber is already installed.
pub fn init_logging(verbosity: u8, quiet: bool, json_output: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity, quiet)));

    let installed = if json_output {
        let json_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(json_layer).try_init()
    } else if io::stderr().is_terminal() && !quiet {
        let fmt_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_ansi(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(fmt_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_ansi(false)
            .without_time()
            .with_filter(env_filter);

        tracing_subscriber::registry().with(fmt_layer).try_init()
    };

    installed.map_err(|err| Error::config(format!("Failed to install logger: {err}")))
}
