//! URL handling error types.

use std::fmt;

/// Error returned when a redirect target or request URL cannot be parsed
/// or resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidUrl {
    message: String,
}

impl InvalidUrl {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for InvalidUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid URL: {}", self.message)
    }
}

impl std::error::Error for InvalidUrl {}

impl From<::url::ParseError> for InvalidUrl {
    fn from(err: ::url::ParseError) -> Self {
        Self::new(err.to_string())
    }
}

/// Error returned when a percent-escape sequence is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPercentEscape {
    sequence: String,
}

impl InvalidPercentEscape {
    pub(crate) fn new(sequence: impl Into<String>) -> Self {
        Self {
            sequence: sequence.into(),
        }
    }
}

impl fmt::Display for InvalidPercentEscape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid percent-escape sequence: '{}'", self.sequence)
    }
}

impl std::error::Error for InvalidPercentEscape {}
