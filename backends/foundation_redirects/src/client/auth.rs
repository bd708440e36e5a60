//! Authorization handling across redirect hops.
//!
//! WHY: An `Authorization` header attached for one origin must not follow a
//! redirect to another. After stripping, an authenticator may still supply
//! credentials that belong to the new origin.
//!
//! WHAT: [`rebuild_auth`] applies the trust-boundary decision, and the
//! [`Authenticator`] hook re-signs the follow-up request. [`HostCredentials`]
//! is a per-host Basic credential store implementing the hook.

use std::collections::BTreeMap;

use super::{PreparedRequest, AUTHORIZATION};
use crate::proxies::basic_auth_value;
use crate::url::should_strip_credentials;

/// Re-applies credentials to a follow-up request.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, request: &mut PreparedRequest);
}

/// Strips `Authorization` when moving from `previous_url` to the request's
/// URL crosses a trust boundary, then lets `authenticator` re-sign.
pub fn rebuild_auth(
    request: &mut PreparedRequest,
    previous_url: &str,
    authenticator: Option<&dyn Authenticator>,
) {
    if request.headers.contains(AUTHORIZATION)
        && should_strip_credentials(previous_url, &request.url)
    {
        tracing::debug!(
            "Stripping Authorization on redirect from {} to {}",
            previous_url,
            request.url
        );
        request.headers.remove(AUTHORIZATION);
    }

    if let Some(authenticator) = authenticator {
        authenticator.authenticate(request);
    }
}

/// Basic credentials keyed by lower-cased hostname.
#[derive(Debug, Clone, Default)]
pub struct HostCredentials {
    entries: BTreeMap<String, (String, String)>,
}

impl HostCredentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(
        mut self,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            host.into().to_ascii_lowercase(),
            (username.into(), password.into()),
        );
        self
    }
}

impl Authenticator for HostCredentials {
    fn authenticate(&self, request: &mut PreparedRequest) {
        let Ok(url) = ::url::Url::parse(&request.url) else {
            return;
        };
        let Some(host) = url.host_str() else {
            return;
        };
        if let Some((username, password)) = self.entries.get(&host.to_ascii_lowercase()) {
            request
                .headers
                .insert(AUTHORIZATION, basic_auth_value(username, password));
        }
    }
}
