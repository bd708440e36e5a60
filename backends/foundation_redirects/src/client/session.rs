//! Session-level state shared by every redirect chain.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    rebuild_auth, Authenticator, CookieStore, MemoryCookieJar, NetrcAuthenticator,
    PreparedRequest, RedirectError, RedirectResolver, Response, SendOptions, Transport,
};
use crate::proxies::{
    rebuild_proxy_authorization, resolve_proxies, select_proxy, ProxyBypassResolver, ProxyMap,
};
use crate::url::InvalidUrl;

/// Default maximum number of redirects followed in one chain.
pub const DEFAULT_MAX_REDIRECTS: usize = 30;

/// Settings and state outliving a single chain: the session cookie jar, the
/// default proxies, environment trust and the redirect limit.
pub struct RedirectSession {
    max_redirects: usize,
    trust_env: bool,
    proxies: ProxyMap,
    cookies: Arc<Mutex<dyn CookieStore>>,
    bypass: ProxyBypassResolver,
    authenticator: Option<Arc<dyn Authenticator>>,
}

impl Default for RedirectSession {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            trust_env: true,
            proxies: ProxyMap::new(),
            cookies: Arc::new(Mutex::new(MemoryCookieJar::new())),
            bypass: ProxyBypassResolver::default(),
            authenticator: None,
        }
    }
}

impl std::fmt::Debug for RedirectSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectSession")
            .field("max_redirects", &self.max_redirects)
            .field("trust_env", &self.trust_env)
            .field("proxies", &self.proxies)
            .finish_non_exhaustive()
    }
}

impl RedirectSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn with_trust_env(mut self, trust_env: bool) -> Self {
        self.trust_env = trust_env;
        self
    }

    #[must_use]
    pub fn with_proxies(mut self, proxies: ProxyMap) -> Self {
        self.proxies = proxies;
        self
    }

    #[must_use]
    pub fn with_cookie_jar(mut self, cookies: Arc<Mutex<dyn CookieStore>>) -> Self {
        self.cookies = cookies;
        self
    }

    #[must_use]
    pub fn with_bypass_resolver(mut self, bypass: ProxyBypassResolver) -> Self {
        self.bypass = bypass;
        self
    }

    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    #[must_use]
    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    #[must_use]
    pub fn trust_env(&self) -> bool {
        self.trust_env
    }

    #[must_use]
    pub fn proxies(&self) -> &ProxyMap {
        &self.proxies
    }

    #[must_use]
    pub fn bypass_resolver(&self) -> &ProxyBypassResolver {
        &self.bypass
    }

    /// Locks the session cookie jar.
    pub fn cookies(&self) -> MutexGuard<'_, dyn CookieStore + 'static> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores cookies set by `response` in the session jar.
    pub fn extract_cookies(&self, request: &PreparedRequest, response: &Response) {
        self.cookies().extract_from_response(request, response);
    }

    /// Copies the session cookies into `jar`.
    pub fn merge_cookies_into(&self, jar: &mut dyn CookieStore) {
        let session = self.cookies();
        jar.merge(&*session);
    }

    /// Re-resolves the proxies for `request` and rebuilds its
    /// `Proxy-Authorization` header, returning the new effective map.
    pub fn rebuild_proxies(&self, request: &mut PreparedRequest, proxies: &ProxyMap) -> ProxyMap {
        let resolved = resolve_proxies(&request.url, proxies, self.trust_env, &self.bypass);
        rebuild_proxy_authorization(&mut request.headers, &request.url, &resolved);
        resolved
    }

    /// Strips or re-signs `Authorization` for a request that moved away from
    /// `previous_url`.
    ///
    /// Without an explicit authenticator, a trusted environment re-signs from
    /// the netrc file found through the session's environment.
    pub fn rebuild_auth(&self, request: &mut PreparedRequest, previous_url: &str) {
        match self.authenticator.as_deref() {
            Some(authenticator) => rebuild_auth(request, previous_url, Some(authenticator)),
            None if self.trust_env => {
                let netrc = NetrcAuthenticator::new(self.bypass.shared_environment());
                rebuild_auth(request, previous_url, Some(&netrc));
            }
            None => rebuild_auth(request, previous_url, None),
        }
    }

    /// Starts a caller-driven redirect chain for `response`, the answer to
    /// `request`.
    #[must_use]
    pub fn resolve_redirects(
        self: &Arc<Self>,
        response: Response,
        request: PreparedRequest,
        options: SendOptions,
    ) -> RedirectResolver {
        RedirectResolver::new(Arc::clone(self), response, request, options)
    }

    /// Sends `request` through `transport` and follows every redirect.
    ///
    /// Session cookies are applied first. The session proxies, overridden
    /// per key by `options.proxies`, form the base map that every hop,
    /// the first one included, resolves against the environment.
    ///
    /// # Errors
    ///
    /// Returns [`RedirectError::InvalidUrl`] when the request URL cannot be
    /// parsed, the transport error of the initial send or the error that
    /// ended the redirect chain.
    pub fn send<T: Transport>(
        self: &Arc<Self>,
        transport: T,
        mut request: PreparedRequest,
        mut options: SendOptions,
    ) -> Result<Response, RedirectError> {
        ::url::Url::parse(&request.url).map_err(InvalidUrl::from)?;

        self.merge_cookies_into(request.cookies.as_mut());
        request.prepare_cookies();

        let mut proxies = self.proxies.clone();
        for (key, value) in options.proxies.iter() {
            proxies.insert(key.clone(), value.clone());
        }
        options.proxies = proxies;

        let mut first = options.clone();
        first.proxies = resolve_proxies(&request.url, &options.proxies, self.trust_env, &self.bypass);
        first.proxy = select_proxy(&request.url, &first.proxies).cloned();

        request.ensure_sendable()?;
        let response = transport.send(&request, &first)?;
        self.extract_cookies(&request, &response);

        RedirectResolver::new(Arc::clone(self), response, request, options)
            .driving(transport)
            .resolve_all()
    }
}
