//! Errors from pushing metrics and from loading exporter settings.

use reqwest::StatusCode;

/// A failed push to the collector.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// The request never produced a response: connect failure, timeout, TLS.
    #[error("transport failure pushing metrics")]
    Transport(#[from] reqwest::Error),

    /// The collector answered with a non-2xx status.
    #[error("collector rejected metrics with HTTP status {0}")]
    Status(StatusCode),
}

impl ExportError {
    /// Short label used for the `reason` dimension of push-failure counts.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Client(_) => "client",
            Self::Transport(err) if err.is_timeout() => "timeout",
            Self::Transport(_) => "transport",
            Self::Status(_) => "status",
        }
    }
}

/// Invalid or missing exporter configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML or lacks a required key.
    #[error("failed to parse config file")]
    Toml(#[from] toml::de::Error),

    /// A required environment variable is unset.
    #[error("missing required setting {0}")]
    Missing(&'static str),

    /// The collector URL does not parse.
    #[error("invalid collector url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// An interval or timeout variable is not an integer.
    #[error("{var} must be a whole number of milliseconds, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    /// An interval or timeout is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}
