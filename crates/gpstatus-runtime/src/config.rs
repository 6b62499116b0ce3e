//! Resolved runtime settings.

use std::time::Duration;

use anyhow::Context;
use reqwest::Url;

use crate::cli::Cli;

/// Log filter env var, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "GPSTATUS_LOG";
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server: Url,
    pub connect_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let server = parse_server(&cli.server)?;
        if cli.connect_timeout == 0 {
            anyhow::bail!("--connect-timeout must be at least 1 second");
        }
        Ok(Self {
            server,
            connect_timeout: Duration::from_secs(cli.connect_timeout),
            idle_timeout: cli
                .idle_timeout
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }
}

/// Parse and check the service base URL.
pub fn parse_server(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid server URL: {raw}"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => anyhow::bail!("unsupported server URL scheme: {other}"),
    }
    if url.cannot_be_a_base() {
        anyhow::bail!("server URL cannot be used as a base: {raw}");
    }
    Ok(url)
}

/// Log filter from `GPSTATUS_LOG`, then `RUST_LOG`, then the default.
pub fn log_filter() -> String {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string())
}
