// 📜 Logging - filter shared by the CLI and the server

use tracing_subscriber::EnvFilter;

/// Level used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Filter from `RUST_LOG`, falling back to `info`
pub fn log_filter() -> EnvFilter {
    log_filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
}

/// `RUST_LOG` value wins as given; no directive is layered on top of it
pub fn log_filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}
