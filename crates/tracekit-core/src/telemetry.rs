//! Tracing initialisation for tracekit binaries.
//!
//! Call [`init_tracing`] once at program start. `RUST_LOG` takes precedence
//! over the level passed in. Later calls are ignored because the global
//! subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default level for the CLI's `--verbose` flag.
pub fn default_level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Directive used when `RUST_LOG` is unset. HTTP client internals stay at
/// `warn`.
fn fallback_directive(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("{level},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn")
}

/// Initialise the global subscriber.
///
/// * `json`: newline-delimited JSON lines including the current span
///   (the experiment session, when one is entered).
/// * `level`: default verbosity when `RUST_LOG` is not set.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback_directive(level)));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_current_span(true).with_target(false))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    result.ok();
}
