//! Error taxonomy for feed connectors
//!
//! Consistency problems (sequence gaps, stale snapshots, crossed books) are
//! not errors here: reconciliation engines report them as state transitions.
//! These types cover what can fail around the engine: wire decoding, REST
//! bootstrap, the sink, and configuration.

use thiserror::Error;
use types::errors::ParseError;

/// A wire message that could not be turned into an update batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed json: {0}")]
    Json(String),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("unexpected message shape: {0}")]
    UnexpectedShape(String),

    #[error("exchange reported an error: {0}")]
    ExchangeError(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Json(err.to_string())
    }
}

/// Failure fetching a bootstrap snapshot over REST.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    /// Definite failure (404 or other 4xx); never retried.
    #[error("snapshot not available (status {status}): {url}")]
    NotFound { url: String, status: u16 },

    /// 5xx, timeout or connection failure; retried with backoff.
    #[error("transient bootstrap failure: {0}")]
    Transient(String),

    #[error("bootstrap response could not be decoded: {0}")]
    Decode(#[from] DecodeError),
}

impl BootstrapError {
    /// Everything except a definite 4xx is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BootstrapError::NotFound { .. })
    }
}

/// The key-value / pub-sub sink rejected an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("sink command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for SinkError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            SinkError::Unavailable(err.to_string())
        } else {
            SinkError::Command(err.to_string())
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown exchange `{0}`")]
    UnknownExchange(String),

    #[error("feed {exchange} needs a {field}")]
    MissingEndpoint {
        exchange: String,
        field: &'static str,
    },

    #[error(transparent)]
    Pair(#[from] ParseError),
}

/// Top-level connector error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("stream closed by exchange")]
    StreamClosed,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The control key is missing; the feed was never enabled.
    #[error("control key `{0}` is not set")]
    MissingControlKey(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Transport(err.to_string())
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
