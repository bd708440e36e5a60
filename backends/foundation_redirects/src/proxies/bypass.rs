//! No-proxy bypass resolution.
//!
//! WHY: Every hop can land on a host that is listed as "do not proxy", either
//! by the caller or by the environment. The decision has to be re-made per
//! hop and must never fail the chain.
//!
//! WHAT: [`ProxyBypassResolver`] combines explicit no-proxy matching (CIDR
//! networks, exact IPv4 addresses and host suffixes) with a pluggable
//! [`SystemProxyBypass`] facility consulted when nothing matched.
//!
//! HOW: The environment is an [`Environment`] trait object held by the
//! resolver. The override and the environment reach the system facility as an
//! immutable [`BypassContext`], so only the process facility ever touches the
//! real environment.

use std::sync::Arc;

use ::url::{Host, Url};

use super::{
    is_ipv4_address, BypassContext, Environment, NoProxyList, ProcessEnvironment,
    ProcessProxyBypass, ProxyMap, SystemProxyBypass,
};

/// Decides whether a URL should skip proxies.
#[derive(Clone)]
pub struct ProxyBypassResolver {
    env: Arc<dyn Environment>,
    system: Arc<dyn SystemProxyBypass>,
}

impl Default for ProxyBypassResolver {
    fn default() -> Self {
        Self::new(Arc::new(ProcessEnvironment), Arc::new(ProcessProxyBypass))
    }
}

impl std::fmt::Debug for ProxyBypassResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyBypassResolver").finish_non_exhaustive()
    }
}

impl ProxyBypassResolver {
    #[must_use]
    pub fn new(env: Arc<dyn Environment>, system: Arc<dyn SystemProxyBypass>) -> Self {
        Self { env, system }
    }

    /// The environment this resolver reads proxy settings from.
    #[must_use]
    pub fn environment(&self) -> &dyn Environment {
        self.env.as_ref()
    }

    /// A shared handle to the same environment.
    #[must_use]
    pub fn shared_environment(&self) -> Arc<dyn Environment> {
        Arc::clone(&self.env)
    }

    /// Returns true if requests to `url` must not go through a proxy.
    ///
    /// `no_proxy_override` replaces the environment's `no_proxy` value for
    /// explicit matching and is handed unchanged to the system facility.
    /// URLs without a hostname always bypass. Failures of the system facility
    /// are logged and count as "no bypass".
    #[must_use]
    pub fn should_bypass(&self, url: &str, no_proxy_override: Option<&str>) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            tracing::debug!("Bypassing proxies for unparsable URL: {}", url);
            return true;
        };

        let Some(hostname) = host_of(&parsed) else {
            tracing::debug!("Bypassing proxies for URL without a host: {}", url);
            return true;
        };

        let effective = match no_proxy_override {
            Some(value) => Some(value.to_string()),
            None => self.env.proxy_var("no_proxy"),
        };

        if let Some(raw) = effective.as_deref() {
            let list = NoProxyList::parse(raw);
            let matched = if is_ipv4_address(&hostname) {
                list.matches_ipv4(&hostname)
            } else {
                list.matches_host(&hostname, explicit_port(url, &parsed))
            };
            if matched {
                tracing::debug!("Host {} matched no_proxy list", hostname);
                return true;
            }
        }

        let ctx = BypassContext {
            no_proxy_override,
            env: self.env.as_ref(),
        };
        match self.system.bypass(&hostname, &ctx) {
            Ok(bypass) => bypass,
            Err(err) => {
                tracing::warn!("System proxy bypass check failed for {}: {}", hostname, err);
                false
            }
        }
    }

    /// Environment proxies applicable to `url`, or an empty map when the URL
    /// bypasses proxies.
    #[must_use]
    pub fn get_environ_proxies(&self, url: &str, no_proxy_override: Option<&str>) -> ProxyMap {
        if self.should_bypass(url, no_proxy_override) {
            ProxyMap::new()
        } else {
            self.env.proxies()
        }
    }
}

/// The port written in the authority of `raw`, including one equal to the
/// scheme default that [`Url::port`] normalizes away.
fn explicit_port(raw: &str, parsed: &Url) -> Option<u16> {
    if let Some(port) = parsed.port() {
        return Some(port);
    }
    let (_, rest) = raw.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host_port)| host_port);
    let port = match host_port.rsplit_once(']') {
        Some((_, after_v6)) => after_v6.strip_prefix(':')?,
        None => host_port.rsplit_once(':')?.1,
    };
    if port.is_empty() {
        None
    } else {
        parsed.port_or_known_default()
    }
}

fn host_of(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) if domain.is_empty() => None,
        Host::Domain(domain) => Some(domain.to_string()),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Ipv6(addr) => Some(addr.to_string()),
    }
}
