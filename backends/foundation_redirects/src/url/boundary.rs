//! Trust boundaries between URLs.
//!
//! WHY: Credentials attached for one origin must not be forwarded to another
//! when a redirect crosses hosts, schemes or ports.
//!
//! WHAT: [`TrustBoundary`] is the (scheme, hostname, port) identity of a URL,
//! with the scheme's default port treated as equal to no explicit port.

use super::InvalidUrl;
use ::url::Url;

/// Default port for the schemes the engine knows about.
#[must_use]
pub fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// The (scheme, hostname, port) identity of a URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustBoundary {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
}

impl TrustBoundary {
    /// Extracts the trust boundary of `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidUrl`] if `raw` is not an absolute URL.
    pub fn parse(raw: &str) -> Result<Self, InvalidUrl> {
        let url = Url::parse(raw)?;
        Ok(Self::from_url(&url))
    }

    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self {
            scheme: url.scheme().to_string(),
            host: url.host_str().map(str::to_ascii_lowercase),
            port: url.port(),
        }
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Explicit port, if one differs from what the URL parser considers the
    /// scheme default.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// True when the port is absent or equal to the scheme default.
    #[must_use]
    pub fn uses_default_port(&self) -> bool {
        match self.port {
            None => true,
            Some(port) => default_port(&self.scheme) == Some(port),
        }
    }

    /// Decides whether moving from `self` to `next` crosses the boundary.
    ///
    /// - a different hostname always crosses;
    /// - `http` on its default port upgrading to `https` on its default port
    ///   does not;
    /// - same scheme with both ports defaulted does not;
    /// - otherwise any change of scheme or port crosses.
    #[must_use]
    pub fn is_crossed_by(&self, next: &TrustBoundary) -> bool {
        if self.host != next.host {
            return true;
        }

        if self.scheme == "http"
            && self.uses_default_port()
            && next.scheme == "https"
            && next.uses_default_port()
        {
            return false;
        }

        let changed_scheme = self.scheme != next.scheme;
        if !changed_scheme && self.uses_default_port() && next.uses_default_port() {
            return false;
        }

        changed_scheme || self.port != next.port
    }
}

/// Returns true when credentials attached for `old_url` must be stripped
/// before sending to `new_url`.
///
/// URLs that cannot be parsed are treated as crossing the boundary.
#[must_use]
pub fn should_strip_credentials(old_url: &str, new_url: &str) -> bool {
    match (TrustBoundary::parse(old_url), TrustBoundary::parse(new_url)) {
        (Ok(old), Ok(new)) => old.is_crossed_by(&new),
        _ => true,
    }
}
