//! Crate-wide error type
//!
//! Source clients report [`FetchError`], with [`ParseError`] nested inside it
//! for payloads of the wrong shape. [`Error`] classifies a failed source so a
//! worker can decide whether the next pass is worth attempting.
//!
//! ```rust,ignore
//! use retrotrack::error::{Error, RetrotrackErrorTrait};
//!
//! let err = Error::from(FetchError::BotChallenge("www.amazon.fr".into()));
//! if err.is_recoverable() {
//!     // leave the variant in rotation
//! }
//! ```

use thiserror::Error;

pub use crate::utils::error::{FetchError, ParseError, PeerDebug, PeerStage};

/// Classification shared by retrotrack errors
pub trait RetrotrackErrorTrait: std::error::Error {
    /// A later acquisition pass may succeed without operator action
    fn is_recoverable(&self) -> bool;

    fn category(&self) -> ErrorCategory;
}

/// Coarse failure class, logged as the `category` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport failures, timeouts, error statuses
    Network,
    /// Bot challenges and rejected tokens
    Blocked,
    /// Payloads that did not have the expected shape
    Parsing,
    /// Missing credentials, bad endpoints
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Blocked => "blocked",
            Self::Parsing => "parsing",
            Self::Config => "config",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Source error: {0}")]
    Source(#[from] FetchError),
}

impl RetrotrackErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Source(e) => e.is_transient(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Source(source) => match source {
                FetchError::MissingCredentials(_) | FetchError::InvalidUrl(_) => {
                    ErrorCategory::Config
                }
                FetchError::BotChallenge(_) | FetchError::Auth(_) => ErrorCategory::Blocked,
                FetchError::Parse(_) => ErrorCategory::Parsing,
                FetchError::Peer(debug) if debug.stage == PeerStage::Decode => {
                    ErrorCategory::Parsing
                }
                _ => ErrorCategory::Network,
            },
        }
    }
}
