//! System-level proxy bypass facilities.
//!
//! WHY: After explicit no-proxy matching fails, the platform gets a final say
//! on whether a host should skip the proxy. On Unix-like systems that
//! facility is driven by the `no_proxy` environment variable.
//!
//! WHAT: The [`SystemProxyBypass`] trait plus three implementations:
//! - [`EnvironmentProxyBypass`] evaluates the facility purely from the
//!   [`BypassContext`] it is handed.
//! - [`ProcessProxyBypass`] is the integration point that really needs the
//!   process environment: it installs the override with a [`ScopedEnvVar`]
//!   and reads the variable back from the process.
//! - [`NoSystemBypass`] never bypasses.

use super::{Environment, ProcessEnvironment, ProxyBypassError, ScopedEnvVar};

/// Immutable inputs handed to a bypass facility.
pub struct BypassContext<'a> {
    /// The caller's original no-proxy override, untouched by earlier
    /// environment fallback.
    pub no_proxy_override: Option<&'a str>,
    /// Environment view used when no override is given.
    pub env: &'a dyn Environment,
}

impl BypassContext<'_> {
    /// The no-proxy value the facility should see: the override when given,
    /// otherwise the environment's own value.
    #[must_use]
    pub fn effective_no_proxy(&self) -> Option<String> {
        match self.no_proxy_override {
            Some(value) => Some(value.to_string()),
            None => self.env.proxy_var("no_proxy"),
        }
    }
}

/// A platform facility deciding whether `hostname` bypasses proxies.
pub trait SystemProxyBypass: Send + Sync {
    /// # Errors
    ///
    /// Implementations may fail; callers treat any error as "no bypass".
    fn bypass(&self, hostname: &str, ctx: &BypassContext<'_>) -> Result<bool, ProxyBypassError>;
}

/// Applies the environment bypass rules for `host` against `no_proxy`.
///
/// `*` bypasses everything. Otherwise every comma separated entry is trimmed,
/// stripped of leading dots and lower-cased, and matches when the host (with
/// or without its port) equals it or ends with `.entry`.
///
/// # Errors
///
/// Returns [`ProxyBypassError::InvalidHost`] for an empty hostname.
pub fn bypass_from_no_proxy(host: &str, no_proxy: Option<&str>) -> Result<bool, ProxyBypassError> {
    if host.is_empty() {
        return Err(ProxyBypassError::InvalidHost(host.to_string()));
    }

    let Some(no_proxy) = no_proxy else {
        return Ok(false);
    };

    if no_proxy.trim() == "*" {
        return Ok(true);
    }

    let host = host.to_ascii_lowercase();
    let host_only = split_port(&host);

    for name in no_proxy.split(',') {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let name = name.trim_start_matches('.').to_ascii_lowercase();
        if host_only == name || host == name {
            return Ok(true);
        }
        let dotted = format!(".{name}");
        if host_only.ends_with(&dotted) || host.ends_with(&dotted) {
            return Ok(true);
        }
    }

    Ok(false)
}

fn split_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((head, port)) if !head.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => head,
        _ => host,
    }
}

/// Evaluates the environment bypass rules from the context alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentProxyBypass;

impl SystemProxyBypass for EnvironmentProxyBypass {
    fn bypass(&self, hostname: &str, ctx: &BypassContext<'_>) -> Result<bool, ProxyBypassError> {
        bypass_from_no_proxy(hostname, ctx.effective_no_proxy().as_deref())
    }
}

/// Evaluates the environment bypass rules against the real process
/// environment, with the caller's override installed for the duration of
/// the check.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessProxyBypass;

impl SystemProxyBypass for ProcessProxyBypass {
    fn bypass(&self, hostname: &str, ctx: &BypassContext<'_>) -> Result<bool, ProxyBypassError> {
        let _scope = ScopedEnvVar::set("no_proxy", ctx.no_proxy_override);
        let no_proxy = ProcessEnvironment.proxy_var("no_proxy");
        bypass_from_no_proxy(hostname, no_proxy.as_deref())
    }
}

/// A facility that never bypasses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSystemBypass;

impl SystemProxyBypass for NoSystemBypass {
    fn bypass(&self, _hostname: &str, _ctx: &BypassContext<'_>) -> Result<bool, ProxyBypassError> {
        Ok(false)
    }
}
