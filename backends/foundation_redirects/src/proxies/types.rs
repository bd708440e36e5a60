use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use percent_encoding::percent_decode_str;
use serde::Deserialize;

/// A proxy configured as a structured entry instead of a bare URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProxyEntry {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A proxy value: either a plain URL string or a structured entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ProxyValue {
    Url(String),
    Entry(ProxyEntry),
}

impl ProxyValue {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Entry(entry) => &entry.url,
        }
    }

    /// Credentials to present to the proxy.
    ///
    /// Structured entries use their explicit credentials; otherwise the
    /// percent-decoded userinfo of the proxy URL is used. Returns `None`
    /// unless both a username and a password are present.
    #[must_use]
    pub fn credentials(&self) -> Option<(String, String)> {
        if let Self::Entry(ProxyEntry {
            username: Some(username),
            password: Some(password),
            ..
        }) = self
        {
            if !username.is_empty() && !password.is_empty() {
                return Some((username.clone(), password.clone()));
            }
        }
        auth_from_url(self.url())
    }
}

impl From<&str> for ProxyValue {
    fn from(value: &str) -> Self {
        Self::Url(value.to_string())
    }
}

impl From<String> for ProxyValue {
    fn from(value: String) -> Self {
        Self::Url(value)
    }
}

/// Extracts percent-decoded `(username, password)` from a URL's userinfo.
#[must_use]
pub fn auth_from_url(url: &str) -> Option<(String, String)> {
    let parsed = ::url::Url::parse(url).ok()?;
    let username = percent_decode_str(parsed.username())
        .decode_utf8_lossy()
        .into_owned();
    let password = percent_decode_str(parsed.password()?)
        .decode_utf8_lossy()
        .into_owned();

    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some((username, password))
}

/// Key under which a per-call no-proxy override may be stored in a [`ProxyMap`].
pub const NO_PROXY_KEY: &str = "no_proxy";

/// Mapping from a proxy key (`scheme://host`, `scheme`, `all://host`, `all`)
/// to a proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ProxyMap {
    inner: BTreeMap<String, ProxyValue>,
}

impl ProxyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ProxyValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ProxyValue>) {
        self.inner.insert(key.into(), value.into());
    }

    /// Inserts `value` only if `key` is not already present.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<ProxyValue>) {
        self.inner.entry(key.into()).or_insert_with(|| value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ProxyValue> {
        self.inner.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ProxyValue> {
        self.inner.remove(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProxyValue)> + '_ {
        self.inner.iter()
    }

    /// The per-call no-proxy override stored under [`NO_PROXY_KEY`].
    #[must_use]
    pub fn no_proxy(&self) -> Option<&str> {
        self.get(NO_PROXY_KEY).map(ProxyValue::url)
    }
}

impl<K, V> FromIterator<(K, V)> for ProxyMap
where
    K: Into<String>,
    V: Into<ProxyValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

/// A parsed no-proxy list: comma separated host suffixes, exact IPv4
/// addresses or IPv4 CIDR networks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoProxyList {
    entries: Vec<String>,
}

impl NoProxyList {
    /// Splits on commas after removing spaces, dropping empty entries.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .replace(' ', "")
            .split(',')
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Matches an IPv4 host against CIDR entries or exact addresses.
    ///
    /// Malformed CIDR entries never match.
    #[must_use]
    pub fn matches_ipv4(&self, host: &str) -> bool {
        self.entries.iter().any(|entry| {
            if is_valid_cidr(entry) {
                address_in_network(host, entry)
            } else {
                host == entry
            }
        })
    }

    /// Matches a hostname by suffix, with and without its port.
    #[must_use]
    pub fn matches_host(&self, hostname: &str, port: Option<u16>) -> bool {
        let host_with_port = match port {
            Some(port) => format!("{hostname}:{port}"),
            None => hostname.to_string(),
        };

        self.entries
            .iter()
            .any(|entry| hostname.ends_with(entry.as_str()) || host_with_port.ends_with(entry.as_str()))
    }
}

/// True if `candidate` is a dotted IPv4 address.
#[must_use]
pub fn is_ipv4_address(candidate: &str) -> bool {
    candidate.parse::<Ipv4Addr>().is_ok()
}

/// True if `network` is `a.b.c.d/mask` with a mask in `1..=32`.
#[must_use]
pub fn is_valid_cidr(network: &str) -> bool {
    if network.matches('/').count() != 1 {
        return false;
    }

    let Some((address, mask)) = network.split_once('/') else {
        return false;
    };

    let Ok(mask) = mask.parse::<u8>() else {
        return false;
    };

    (1..=32).contains(&mask) && is_ipv4_address(address)
}

/// True if `ip` lies within the CIDR `network`. Any parse failure is a
/// non-match.
#[must_use]
pub fn address_in_network(ip: &str, network: &str) -> bool {
    let Ok(ip) = ip.parse::<Ipv4Addr>() else {
        return false;
    };
    let Some((address, bits)) = network.split_once('/') else {
        return false;
    };
    let Ok(address) = address.parse::<Ipv4Addr>() else {
        return false;
    };
    let Ok(bits) = bits.parse::<u32>() else {
        return false;
    };
    if !(1..=32).contains(&bits) {
        return false;
    }

    let netmask = u32::MAX << (32 - bits);
    (u32::from(ip) & netmask) == (u32::from(address) & netmask)
}
