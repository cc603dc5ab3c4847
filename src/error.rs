//! Error types for the intent gateway
//!
//! Every failure that leaves the core carries one of a fixed set of kinds.
//! The gateway reports `kind()` verbatim in the JSON-RPC `data` field, so
//! the kind names are part of the wire contract.

use crate::chains::ChainError;
use crate::prices::PriceError;
use crate::quotes::QuoteError;
use crate::units::UnitsError;
use crate::wallet::SigningError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported route: {0}")]
    UnsupportedRoute(String),

    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(QuoteError),

    #[error("Signing unavailable: {0}")]
    SigningUnavailable(String),

    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Chain unreachable: {0}")]
    ChainUnreachable(String),

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Token metadata unavailable: {0}")]
    TokenMetadataUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable kind name reported to callers
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidParameter(_) => "InvalidParameter",
            Error::UnsupportedRoute(_) => "UnsupportedRoute",
            Error::QuoteUnavailable(_) => "QuoteUnavailable",
            Error::SigningUnavailable(_) => "SigningUnavailable",
            Error::SubmissionRejected(_) => "SubmissionRejected",
            Error::ChainUnreachable(_) => "ChainUnreachable",
            Error::Timeout(_) => "Timeout",
            Error::TokenMetadataUnavailable(_) => "TokenMetadataUnavailable",
            Error::Config(_) => "ConfigError",
        }
    }

    /// Sub-kind for quote failures (`NoRoute`, `UpstreamUnavailable`, `InvalidPair`)
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Error::QuoteUnavailable(e) => Some(e.reason()),
            _ => None,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidParameter(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::UnsupportedRoute(msg.into())
    }
}

impl From<ChainError> for Error {
    fn from(err: ChainError) -> Self {
        let msg = err.to_string();
        match err {
            ChainError::InvalidAddress(_) | ChainError::Amount(_) => Error::InvalidParameter(msg),
            ChainError::Unreachable(_) | ChainError::Timeout(_) => Error::ChainUnreachable(msg),
            ChainError::TokenMetadata(_) => Error::TokenMetadataUnavailable(msg),
            ChainError::Signing(_) => Error::SigningUnavailable(msg),
            ChainError::Rejected(_) => Error::SubmissionRejected(msg),
            ChainError::UnsupportedCall(_) => Error::UnsupportedRoute(msg),
        }
    }
}

impl From<QuoteError> for Error {
    fn from(err: QuoteError) -> Self {
        match err {
            QuoteError::Timeout(msg) => Error::Timeout(msg),
            other => Error::QuoteUnavailable(other),
        }
    }
}

impl From<PriceError> for Error {
    fn from(err: PriceError) -> Self {
        match err {
            PriceError::Timeout => Error::Timeout(err.to_string()),
            PriceError::NotListed(msg) => Error::QuoteUnavailable(QuoteError::InvalidPair(msg)),
            PriceError::Unavailable(msg) => {
                Error::QuoteUnavailable(QuoteError::UpstreamUnavailable(msg))
            }
        }
    }
}

impl From<SigningError> for Error {
    fn from(err: SigningError) -> Self {
        Error::SigningUnavailable(err.to_string())
    }
}

impl From<UnitsError> for Error {
    fn from(err: UnitsError) -> Self {
        Error::InvalidParameter(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
