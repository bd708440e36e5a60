use derive_more::From;
use std::io;

use super::Response;
use crate::url::InvalidUrl;

/// Errors raised while reading a response body.
#[derive(From, Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    /// The chunked transfer encoding was malformed.
    #[from(ignore)]
    ChunkedEncoding(String),

    /// The content encoding (gzip, deflate, ...) could not be decoded.
    #[from(ignore)]
    ContentDecoding(String),

    /// The underlying stream failed.
    #[from(ignore)]
    Io(String),
}

impl From<io::Error> for BodyError {
    fn from(err: io::Error) -> Self {
        BodyError::Io(err.to_string())
    }
}

impl std::error::Error for BodyError {}

impl core::fmt::Display for BodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChunkedEncoding(msg) => write!(f, "Invalid chunked body: {msg}"),
            Self::ContentDecoding(msg) => write!(f, "Failed to decode body: {msg}"),
            Self::Io(msg) => write!(f, "I/O error while reading body: {msg}"),
        }
    }
}

/// Errors reported by a [`super::Transport`].
#[derive(From, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established.
    #[from(ignore)]
    ConnectionFailed(String),

    /// The send exceeded its timeout.
    #[from(ignore)]
    Timeout,

    /// The transport cannot send requests.
    #[from(ignore)]
    Detached,

    /// The request body could not be read for sending.
    #[from(ignore)]
    BodyUnavailable(String),

    /// I/O error during the exchange.
    #[from(ignore)]
    Io(String),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

impl std::error::Error for TransportError {}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Detached => write!(f, "Transport is detached and cannot send"),
            Self::BodyUnavailable(msg) => write!(f, "Request body unavailable: {msg}"),
            Self::Io(msg) => write!(f, "I/O error during request: {msg}"),
        }
    }
}

/// Errors ending a redirect chain.
#[derive(From, Debug)]
pub enum RedirectError {
    /// The chain reached its redirect limit.
    #[from(ignore)]
    TooManyRedirects {
        limit: usize,
        response: Box<Response>,
    },

    /// The `Location` header could not be turned into a URL.
    #[from(ignore)]
    InvalidLocation(String),

    /// A request or response URL could not be parsed.
    #[from(ignore)]
    InvalidUrl(String),

    /// A follow-up request carries a stream that could not be rewound.
    #[from(ignore)]
    UnrewindableBody(String),

    /// The transport failed to send a hop.
    #[from]
    Transport(TransportError),

    /// A response body could not be read.
    #[from]
    Body(BodyError),

    /// A self-driving operation was requested without a transport.
    NoTransport,

    /// The resolver was used out of order.
    InvalidState,
}

impl From<InvalidUrl> for RedirectError {
    fn from(err: InvalidUrl) -> Self {
        RedirectError::InvalidUrl(err.message().to_string())
    }
}

impl RedirectError {
    /// The response that ended the chain, if the error carries one.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::TooManyRedirects { response, .. } => Some(response),
            _ => None,
        }
    }
}

impl std::error::Error for RedirectError {}

impl core::fmt::Display for RedirectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooManyRedirects { limit, response } => {
                write!(
                    f,
                    "Exceeded {limit} redirects (last response {} from {})",
                    response.status(),
                    response.url()
                )
            }
            Self::InvalidLocation(location) => write!(f, "Invalid redirect location: {location}"),
            Self::InvalidUrl(msg) => write!(f, "Invalid URL: {msg}"),
            Self::UnrewindableBody(msg) => {
                write!(f, "Unable to rewind request body for redirect: {msg}")
            }
            Self::Transport(err) => write!(f, "Transport error: {err}"),
            Self::Body(err) => write!(f, "Body error: {err}"),
            Self::NoTransport => write!(f, "No transport configured for a self-driving chain"),
            Self::InvalidState => write!(f, "Redirect resolver used in an invalid state"),
        }
    }
}
