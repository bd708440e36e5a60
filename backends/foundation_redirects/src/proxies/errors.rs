use derive_more::From;

/// Errors raised by a system proxy-bypass facility.
///
/// These never escape the bypass resolver; they are logged and treated as
/// "do not bypass".
#[derive(From, Debug, Clone, PartialEq, Eq)]
pub enum ProxyBypassError {
    /// The hostname could not be resolved by the facility.
    #[from(ignore)]
    UnresolvableHost(String),

    /// The hostname was empty or otherwise unusable.
    #[from(ignore)]
    InvalidHost(String),
}

impl std::error::Error for ProxyBypassError {}

impl core::fmt::Display for ProxyBypassError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvableHost(host) => write!(f, "Unable to resolve host: {host}"),
            Self::InvalidHost(host) => write!(f, "Invalid hostname: {host:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// WHY: Bypass errors are only ever logged, so their messages must be useful
    /// WHAT: Tests the display output includes the host
    #[test]
    fn test_proxy_bypass_error_display() {
        let error = ProxyBypassError::UnresolvableHost("intranet".to_string());
        assert!(error.to_string().contains("intranet"));

        let error = ProxyBypassError::InvalidHost(String::new());
        assert!(error.to_string().contains("Invalid hostname"));
    }
}
