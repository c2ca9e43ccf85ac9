//! Error types for the acquisition sources
//!
//! This module defines custom error types used by the external source clients.

use std::fmt;

use thiserror::Error;

/// Errors that can occur while querying an external source
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Anti-bot challenge page instead of results
    #[error("Bot challenge served by {0}")]
    BotChallenge(String),

    /// Token exchange or bearer token rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Required credentials are not configured
    #[error("Missing credentials: {0}")]
    MissingCredentials(&'static str),

    /// Peer marketplace failed after its retry budget
    #[error("Peer marketplace failure: {0}")]
    Peer(PeerDebug),

    /// Response body could not be interpreted
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Classify a reqwest error, separating timeouts
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }

    /// Transient errors resolve themselves on a later pass
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::MissingCredentials(_) | Self::InvalidUrl(_))
    }
}

/// Errors that can occur while interpreting source payloads
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// JSON payload did not match the expected shape
    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),
}

/// Stage at which a peer marketplace request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStage {
    Bootstrap,
    Search,
    Decode,
}

impl fmt::Display for PeerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bootstrap => "bootstrap",
            Self::Search => "search",
            Self::Decode => "decode",
        };
        f.write_str(s)
    }
}

/// Debug payload describing where a peer request failed
#[derive(Debug, Clone, PartialEq)]
pub struct PeerDebug {
    pub stage: PeerStage,
    pub status: Option<u16>,
    pub detail: String,
    /// Whether the session cookie was refreshed before giving up
    pub refreshed: bool,
}

impl fmt::Display for PeerDebug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage={}", self.stage)?;
        if let Some(status) = self.status {
            write!(f, " status={status}")?;
        }
        write!(f, " refreshed={} detail={}", self.refreshed, self.detail)
    }
}
