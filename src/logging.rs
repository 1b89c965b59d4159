//! Tracing setup for the CLI.
//!
//! `SCOPE_SHAPE_LOG` (or `RUST_LOG`) turns logging on and takes the usual
//! filter syntax, e.g. `SCOPE_SHAPE_LOG=scope_shape::specialize=trace`.
//! `SCOPE_SHAPE_LOG_FORMAT=json` switches to one JSON object per event.
//! Everything goes to stderr so projected documents on stdout stay clean.
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var("SCOPE_SHAPE_LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

fn build_filter() -> EnvFilter {
    if let Ok(val) = std::env::var("SCOPE_SHAPE_LOG") {
        EnvFilter::builder().parse_lossy(val)
    } else {
        EnvFilter::from_default_env()
    }
}

/// Installs the global subscriber; a no-op unless a log variable is set.
pub fn init_tracing() {
    let has_own_log = std::env::var("SCOPE_SHAPE_LOG").is_ok();
    let has_rust_log = std::env::var("RUST_LOG").is_ok();
    if !has_own_log && !has_rust_log {
        return;
    }

    let filter = build_filter();
    match LogFormat::from_env() {
        LogFormat::Json => {
            let json_layer = fmt::layer().json().with_writer(std::io::stderr);
            Registry::default().with(filter).with(json_layer).init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
