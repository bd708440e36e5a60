//! TOML configuration for redirect sessions.
//!
//! ```toml
//! max_redirects = 10
//! trust_env = false
//! no_proxy = "localhost,10.0.0.0/8"
//! verify = true
//! ca_bundle = "/etc/ssl/bundle.pem"
//! timeout_secs = 30
//!
//! [proxies]
//! http = "http://proxy.internal:3128"
//! "all://metrics.internal" = { url = "http://metrics-proxy:8080", username = "svc", password = "secret" }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use derive_more::derive::From;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::client::{ClientCert, RedirectSession, SendOptions, TlsVerify, DEFAULT_MAX_REDIRECTS};
use crate::proxies::{Environment, ProxyMap, NO_PROXY_KEY};

#[derive(Debug, From)]
pub enum ConfigError {
    #[from(ignore)]
    IOError(std::io::Error),

    #[from(ignore)]
    DeserializationFailed(toml::de::Error),

    InvalidPath(PathBuf),
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::DeserializationFailed(value)
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IOError(err) => write!(f, "Failed to read config: {err}"),
            Self::DeserializationFailed(err) => write!(f, "Invalid config: {err}"),
            Self::InvalidPath(path) => write!(f, "Config file not found: {}", path.display()),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub fn from_path<T, V>(target: V) -> ConfigResult<T>
where
    T: DeserializeOwned,
    V: Into<PathBuf>,
{
    let target_path = target.into();
    if !target_path.is_file() {
        return Err(ConfigError::InvalidPath(target_path));
    }
    let config_content = std::fs::read_to_string(target_path)?;
    from_str(&config_content)
}

pub fn from_str<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config_obj: T = toml::from_str(content)?;
    Ok(config_obj)
}

/// Environment variables naming a CA bundle, checked in order when
/// verification is on and the environment is trusted.
pub const CA_BUNDLE_ENV_VARS: [&str; 2] = ["REQUESTS_CA_BUNDLE", "CURL_CA_BUNDLE"];

/// Redirect session settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedirectConfig {
    pub max_redirects: usize,
    pub trust_env: bool,
    pub proxies: ProxyMap,
    pub no_proxy: Option<String>,
    pub verify: bool,
    pub ca_bundle: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            trust_env: true,
            proxies: ProxyMap::new(),
            no_proxy: None,
            verify: true,
            ca_bundle: None,
            client_cert: None,
            client_key: None,
            timeout_secs: None,
        }
    }
}

impl RedirectConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, unreadable or invalid.
    pub fn from_path<V: Into<PathBuf>>(target: V) -> ConfigResult<Self> {
        from_path(target)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::DeserializationFailed`] for invalid TOML.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        from_str(content)
    }

    /// The configured proxies with the `no_proxy` override folded in.
    #[must_use]
    pub fn proxy_map(&self) -> ProxyMap {
        let mut proxies = self.proxies.clone();
        if let Some(no_proxy) = &self.no_proxy {
            proxies.insert(NO_PROXY_KEY, no_proxy.as_str());
        }
        proxies
    }

    #[must_use]
    pub fn into_session(self) -> RedirectSession {
        RedirectSession::new()
            .with_max_redirects(self.max_redirects)
            .with_trust_env(self.trust_env)
            .with_proxies(self.proxy_map())
    }

    /// Certificate verification setting. With verification on, no explicit
    /// bundle and a trusted environment, a bundle named by
    /// [`CA_BUNDLE_ENV_VARS`] is used.
    #[must_use]
    pub fn tls_verify(&self, env: &dyn Environment) -> TlsVerify {
        if !self.verify {
            return TlsVerify::Disabled;
        }
        if let Some(bundle) = &self.ca_bundle {
            return TlsVerify::CaBundle(bundle.clone());
        }
        if self.trust_env {
            for name in CA_BUNDLE_ENV_VARS {
                if let Some(bundle) = env.get(name).filter(|value| !value.is_empty()) {
                    return TlsVerify::CaBundle(PathBuf::from(bundle));
                }
            }
        }
        TlsVerify::Enabled
    }

    #[must_use]
    pub fn client_certificate(&self) -> Option<ClientCert> {
        match (&self.client_cert, &self.client_key) {
            (Some(cert), Some(key)) => Some(ClientCert::Pair {
                cert: cert.clone(),
                key: key.clone(),
            }),
            (Some(cert), None) => Some(ClientCert::Single(cert.clone())),
            (None, _) => None,
        }
    }

    #[must_use]
    pub fn send_options(&self, env: &dyn Environment) -> SendOptions {
        let mut options = SendOptions::new()
            .with_proxies(self.proxy_map())
            .with_verify(self.tls_verify(env));
        if let Some(secs) = self.timeout_secs {
            options = options.with_timeout(Duration::from_secs(secs));
        }
        if let Some(cert) = self.client_certificate() {
            options = options.with_cert(cert);
        }
        options
    }
}
