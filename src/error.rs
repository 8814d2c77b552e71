use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::error::DomainError;
use crate::domain::id::{OrderId, VenueId};

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("unsupported venue: {0}")]
    UnsupportedVenue(String),

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Failure reported by a single venue adapter.
///
/// Cloneable so that one terminal streaming failure can be delivered to
/// every subscriber of a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VenueError {
    #[error("credentials required for {operation}")]
    MissingCredentials { operation: &'static str },

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by venue: {0}")]
    RateLimited(String),

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("rejected{}: {message}", code_suffix(.code))]
    Rejected {
        code: Option<String>,
        message: String,
    },

    #[error("unexpected payload: {0}")]
    Decode(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("not connected")]
    NotConnected,

    #[error("stream unavailable for {channel}: {reason}")]
    StreamUnavailable { channel: String, reason: String },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default()
}

impl VenueError {
    /// Whether a retry may succeed without any change to the request.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Server { .. }
        )
    }

    /// Local configuration problems, detected before any network call.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials { .. } | Self::InvalidCredentials(_)
        )
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            code: None,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Classify a transport-level reqwest failure.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for VenueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("{venue}: {source}")]
    Exchange {
        venue: VenueId,
        #[source]
        source: VenueError,
    },

    #[error("{0}: not connected")]
    NotConnected(VenueId),

    #[error("no connected venue can serve {symbol}")]
    NoVenueAvailable { symbol: String },

    #[error("{venue}: unknown order {order_id}")]
    UnknownOrder { venue: VenueId, order_id: OrderId },

    #[error("{venue}: order amount {amount} exceeds limit {limit}")]
    OrderTooLarge {
        venue: VenueId,
        amount: Decimal,
        limit: Decimal,
    },

    #[error("{venue}: expected slippage {expected} exceeds limit {limit}")]
    SlippageExceeded {
        venue: VenueId,
        expected: Decimal,
        limit: Decimal,
    },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub const fn exchange(venue: VenueId, source: VenueError) -> Self {
        Self::Exchange { venue, source }
    }

    /// The venue this error originated from, if any.
    #[must_use]
    pub const fn venue(&self) -> Option<VenueId> {
        match self {
            Self::Exchange { venue, .. }
            | Self::NotConnected(venue)
            | Self::UnknownOrder { venue, .. }
            | Self::OrderTooLarge { venue, .. }
            | Self::SlippageExceeded { venue, .. } => Some(*venue),
            _ => None,
        }
    }

    /// The underlying venue failure, if this error came from an adapter.
    #[must_use]
    pub const fn venue_error(&self) -> Option<&VenueError> {
        match self {
            Self::Exchange { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Tag adapter-internal results with the venue they came from.
pub trait VenueResultExt<T> {
    fn for_venue(self, venue: VenueId) -> Result<T>;
}

impl<T> VenueResultExt<T> for std::result::Result<T, VenueError> {
    fn for_venue(self, venue: VenueId) -> Result<T> {
        self.map_err(|source| Error::exchange(venue, source))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
