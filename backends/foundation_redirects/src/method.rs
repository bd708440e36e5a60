//! HTTP methods and the redirect method-rewrite table.

use std::fmt;

/// HTTP method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET request
    Get,
    /// POST request
    Post,
    /// PUT request
    Put,
    /// DELETE request
    Delete,
    /// PATCH request
    Patch,
    /// HEAD request
    Head,
    /// OPTIONS request
    Options,
    /// TRACE request
    Trace,
    /// CONNECT request
    Connect,
    /// Any extension method, stored upper-cased.
    Custom(String),
}

impl Method {
    /// Returns the method name as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Custom(name) => name,
        }
    }
}

impl From<&str> for Method {
    fn from(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            other => Method::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The redirect status codes the engine follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedirectStatus {
    /// 301
    MovedPermanently,
    /// 302
    Found,
    /// 303
    SeeOther,
    /// 307
    TemporaryRedirect,
    /// 308
    PermanentRedirect,
}

impl RedirectStatus {
    #[must_use]
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            301 => Some(Self::MovedPermanently),
            302 => Some(Self::Found),
            303 => Some(Self::SeeOther),
            307 => Some(Self::TemporaryRedirect),
            308 => Some(Self::PermanentRedirect),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::MovedPermanently => 301,
            Self::Found => 302,
            Self::SeeOther => 303,
            Self::TemporaryRedirect => 307,
            Self::PermanentRedirect => 308,
        }
    }

    /// 307 and 308 require the follow-up to repeat the method and body.
    #[must_use]
    pub fn preserves_body(self) -> bool {
        matches!(self, Self::TemporaryRedirect | Self::PermanentRedirect)
    }
}

/// Returns true if `code` is one of the followed redirect codes.
#[must_use]
pub fn is_redirect_status(code: u16) -> bool {
    RedirectStatus::from_code(code).is_some()
}

/// Returns true if a follow-up for `code` must keep its body and body headers.
#[must_use]
pub fn preserves_body(code: u16) -> bool {
    RedirectStatus::from_code(code).is_some_and(RedirectStatus::preserves_body)
}

/// Maps the previous method and the redirect status to the follow-up method.
///
/// | status | previous method | result |
/// |---|---|---|
/// | 303 | anything but HEAD | GET |
/// | 302 | anything but HEAD | GET |
/// | 301 | POST | GET |
/// | anything else | any | unchanged |
#[must_use]
pub fn rebuild_method(method: &Method, status_code: u16) -> Method {
    match (status_code, method) {
        (303 | 302, m) if *m != Method::Head => Method::Get,
        (301, Method::Post) => Method::Get,
        _ => method.clone(),
    }
}
