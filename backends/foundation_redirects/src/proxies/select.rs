//! Proxy selection and per-hop proxy rebuilding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::{ProxyBypassResolver, ProxyMap, ProxyValue};
use crate::client::{Headers, PROXY_AUTHORIZATION};
use crate::url::split_scheme;

/// Picks the proxy for `url` from `proxies`.
///
/// For URLs with a hostname the keys `scheme://host`, `scheme`, `all://host`
/// and `all` are tried in that order. Hostless URLs only consult `scheme`
/// and then `all`.
#[must_use]
pub fn select_proxy<'a>(url: &str, proxies: &'a ProxyMap) -> Option<&'a ProxyValue> {
    let (scheme, host) = match ::url::Url::parse(url) {
        Ok(parsed) => (
            parsed.scheme().to_string(),
            parsed.host_str().filter(|h| !h.is_empty()).map(str::to_string),
        ),
        Err(_) => (
            split_scheme(url)
                .map(|(scheme, _)| scheme.to_ascii_lowercase())
                .unwrap_or_default(),
            None,
        ),
    };

    let Some(host) = host else {
        return proxies.get(&scheme).or_else(|| proxies.get("all"));
    };

    [
        format!("{scheme}://{host}"),
        scheme.clone(),
        format!("all://{host}"),
        "all".to_string(),
    ]
    .iter()
    .find_map(|key| proxies.get(key))
}

/// Builds the effective proxy map for `url`.
///
/// Starts from the caller's `proxies`. When `trust_env` is set and the URL is
/// not bypassed (honouring the map's own `no_proxy` entry), the environment
/// proxy for the URL's scheme, or the environment's `all` proxy, fills in a
/// missing scheme entry. Caller supplied entries are never replaced.
#[must_use]
pub fn resolve_proxies(
    url: &str,
    proxies: &ProxyMap,
    trust_env: bool,
    bypass: &ProxyBypassResolver,
) -> ProxyMap {
    let mut resolved = proxies.clone();
    let scheme = match ::url::Url::parse(url) {
        Ok(parsed) => parsed.scheme().to_string(),
        Err(_) => split_scheme(url)
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .unwrap_or_default(),
    };

    if trust_env && !bypass.should_bypass(url, proxies.no_proxy()) {
        let environ = bypass.environment().proxies();
        if let Some(proxy) = environ.get(&scheme).or_else(|| environ.get("all")) {
            tracing::debug!("Using environment proxy {} for {}", proxy.url(), url);
            resolved.set_default(scheme, proxy.clone());
        }
    }

    resolved
}

/// Formats `Basic` credentials for a proxy.
#[must_use]
pub fn basic_auth_value(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Replaces `Proxy-Authorization` for a request to `url` routed via `proxies`.
///
/// Any existing header is removed. A new one is set only when the proxy for
/// the URL's scheme carries credentials and the scheme is not `https`, where
/// the credentials belong to the tunnel rather than the request.
pub fn rebuild_proxy_authorization(headers: &mut Headers, url: &str, proxies: &ProxyMap) {
    headers.remove(PROXY_AUTHORIZATION);

    let scheme = match ::url::Url::parse(url) {
        Ok(parsed) => parsed.scheme().to_string(),
        Err(_) => return,
    };

    if scheme.starts_with("https") {
        return;
    }

    let Some(proxy) = proxies.get(&scheme) else {
        return;
    };

    if let Some((username, password)) = proxy.credentials() {
        tracing::debug!("Setting Proxy-Authorization for proxy {}", proxy.url());
        headers.insert(PROXY_AUTHORIZATION, basic_auth_value(&username, &password));
    }
}
