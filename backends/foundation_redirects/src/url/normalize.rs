//! Redirect target normalization.
//!
//! WHY: Servers send `Location` values in every shape: absolute URLs,
//! protocol-relative `//host/path`, bare paths, and raw non-ASCII text.
//! The follow-up request needs an absolute, safely encoded URL and must keep
//! the fragment the user originally asked for.
//!
//! WHAT: `normalize_redirect_url` resolves a target against the URL of the
//! response that carried it, applying the fragment carry-over rule, and
//! `requote_uri` re-encodes unsafe octets without double encoding.
//!
//! HOW: Protocol-relative targets borrow the base scheme. Targets without a
//! network location are joined against the base with RFC 3986 reference
//! resolution (via the `url` crate). Absolute targets are only re-quoted.

use super::{has_network_location, InvalidPercentEscape, InvalidUrl};
use ::url::Url;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left untouched when re-quoting, `%` included so that existing
/// escapes survive.
const REQUOTE_SAFE_WITH_PERCENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'%')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'?')
    .remove(b'@')
    .remove(b'[')
    .remove(b']');

/// Used when the input carries a malformed escape: a bare `%` is encoded.
const REQUOTE_SAFE_WITHOUT_PERCENT: &AsciiSet = &REQUOTE_SAFE_WITH_PERCENT.add(b'%');

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

/// Un-escapes any percent-escape sequences in a URI that encode unreserved
/// characters, leaving all reserved and illegal characters escaped.
///
/// # Errors
///
/// Returns [`InvalidPercentEscape`] when a `%` is followed by two
/// alphanumeric characters that are not a hexadecimal byte.
pub fn unquote_unreserved(uri: &str) -> Result<String, InvalidPercentEscape> {
    let mut parts = uri.split('%');
    let mut out = String::with_capacity(uri.len());

    if let Some(first) = parts.next() {
        out.push_str(first);
    }

    for part in parts {
        match part.get(0..2) {
            Some(hex) if hex.chars().all(char::is_alphanumeric) => {
                let value =
                    u8::from_str_radix(hex, 16).map_err(|_| InvalidPercentEscape::new(hex))?;
                let decoded = char::from(value);
                if is_unreserved(decoded) {
                    out.push(decoded);
                    out.push_str(&part[2..]);
                } else {
                    out.push('%');
                    out.push_str(part);
                }
            }
            _ => {
                out.push('%');
                out.push_str(part);
            }
        }
    }

    Ok(out)
}

/// Re-quotes a URI so that it is fully and consistently percent-encoded.
///
/// Applying it twice yields the same result as applying it once.
#[must_use]
pub fn requote_uri(uri: &str) -> String {
    match unquote_unreserved(uri) {
        Ok(unquoted) => utf8_percent_encode(&unquoted, REQUOTE_SAFE_WITH_PERCENT).to_string(),
        Err(err) => {
            tracing::debug!("Re-quoting with bare percent signs escaped: {}", err);
            utf8_percent_encode(uri, REQUOTE_SAFE_WITHOUT_PERCENT).to_string()
        }
    }
}

/// The result of normalizing one redirect target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    /// Absolute, re-quoted URL for the follow-up request.
    pub url: String,
    /// Fragment to carry into the next hop, if any.
    pub fragment: Option<String>,
}

impl NormalizedUrl {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

/// Resolves a redirect `target` against `base_url`.
///
/// - `//host/path` borrows the scheme of `base_url`.
/// - A target without its own fragment inherits `inherited_fragment`; a
///   target with a fragment replaces it for subsequent hops.
/// - Targets without a network location are joined against `base_url`,
///   otherwise the target is only re-quoted.
///
/// # Errors
///
/// Returns [`InvalidUrl`] when `base_url` is needed and cannot be parsed, or
/// when the resolved target is not a valid absolute URL.
pub fn normalize_redirect_url(
    target: &str,
    base_url: &str,
    inherited_fragment: Option<&str>,
) -> Result<NormalizedUrl, InvalidUrl> {
    let target = if target.starts_with("//") {
        let base = Url::parse(base_url)?;
        format!("{}:{}", base.scheme(), target)
    } else {
        target.to_string()
    };

    let (without_fragment, own_fragment) = match target.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (target.as_str(), None),
    };

    let fragment = match own_fragment.filter(|f| !f.is_empty()) {
        Some(own) => Some(own.to_string()),
        None => inherited_fragment
            .filter(|f| !f.is_empty())
            .map(str::to_string),
    };

    let candidate = match &fragment {
        Some(frag) => format!("{without_fragment}#{frag}"),
        None => without_fragment.to_string(),
    };

    let url = if has_network_location(&candidate) {
        let requoted = requote_uri(&candidate);
        Url::parse(&requoted)
            .map_err(|e| InvalidUrl::new(format!("failed to parse absolute location: {e}")))?;
        requoted
    } else {
        let base = Url::parse(base_url)?;
        base.join(&requote_uri(&candidate))
            .map_err(|e| InvalidUrl::new(format!("failed to join relative location: {e}")))?
            .to_string()
    };

    Ok(NormalizedUrl { url, fragment })
}

/// Returns the fragment of `url`, if it has a non-empty one.
#[must_use]
pub fn fragment_of(url: &str) -> Option<&str> {
    url.split_once('#')
        .map(|(_, fragment)| fragment)
        .filter(|f| !f.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// WHY: Protocol-relative redirects must borrow the scheme of the base URL
    /// WHAT: Tests `//host/path` resolution against an https base
    #[test]
    fn test_protocol_relative_target_uses_base_scheme() {
        let normalized =
            normalize_redirect_url("//cdn.example.com/x", "https://a.com/y", None).unwrap();
        assert_eq!(normalized.url, "https://cdn.example.com/x");
        assert_eq!(normalized.fragment, None);
    }

    /// WHY: A target without a fragment must keep the fragment the user asked for
    /// WHAT: Tests inherited fragment attachment on a relative target
    #[test]
    fn test_relative_target_inherits_fragment() {
        let normalized =
            normalize_redirect_url("/p?q=1", "http://a.com/start", Some("frag")).unwrap();
        assert_eq!(normalized.url, "http://a.com/p?q=1#frag");
        assert!(normalized.url.ends_with("#frag"));
        assert_eq!(normalized.fragment.as_deref(), Some("frag"));
    }

    /// WHY: A target carrying its own fragment replaces the inherited one
    /// WHAT: Tests that the new fragment wins and becomes the carried fragment
    #[test]
    fn test_own_fragment_replaces_inherited() {
        let normalized =
            normalize_redirect_url("http://b.com/x#mine", "http://a.com/", Some("old")).unwrap();
        assert_eq!(normalized.url, "http://b.com/x#mine");
        assert_eq!(normalized.fragment.as_deref(), Some("mine"));
    }

    /// WHY: Relative references follow RFC 3986 joining rules
    /// WHAT: Tests path-relative and dot-segment targets
    #[test]
    fn test_relative_path_join() {
        let normalized = normalize_redirect_url("next", "http://a.com/dir/page", None).unwrap();
        assert_eq!(normalized.url, "http://a.com/dir/next");

        let normalized = normalize_redirect_url("../up", "http://a.com/dir/sub/page", None).unwrap();
        assert_eq!(normalized.url, "http://a.com/dir/up");

        let normalized = normalize_redirect_url("?page=2", "http://a.com/list", None).unwrap();
        assert_eq!(normalized.url, "http://a.com/list?page=2");
    }

    /// WHY: Unsafe octets in a Location header must be encoded exactly once
    /// WHAT: Tests spaces and non-ASCII characters in an absolute target
    #[test]
    fn test_absolute_target_is_requoted() {
        let normalized =
            normalize_redirect_url("http://a.com/a b/café", "http://x.com/", None).unwrap();
        assert_eq!(normalized.url, "http://a.com/a%20b/caf%C3%A9");
    }

    /// WHY: Normalizing an already normalized URL must not double-encode
    /// WHAT: Tests idempotence under re-application
    #[test]
    fn test_normalization_is_idempotent() {
        let once = normalize_redirect_url("/a b/%7Euser?x=%2F", "http://a.com/", None).unwrap();
        let twice = normalize_redirect_url(&once.url, "http://a.com/", None).unwrap();
        assert_eq!(once.url, twice.url);
        assert_eq!(once.url, "http://a.com/a%20b/~user?x=%2F");
    }

    /// WHY: Unreserved characters should not stay escaped
    /// WHAT: Tests that %41 is decoded while %2F is preserved
    #[test]
    fn test_unquote_unreserved() {
        assert_eq!(unquote_unreserved("/%41%2F%7e").unwrap(), "/A%2F~");
        assert_eq!(unquote_unreserved("100%").unwrap(), "100%");
        assert!(unquote_unreserved("/%zz").is_err());
    }

    /// WHY: A malformed escape must not abort normalization
    /// WHAT: Tests that requote falls back to escaping the bare percent sign
    #[test]
    fn test_requote_malformed_escape() {
        assert_eq!(requote_uri("/a%zzb"), "/a%25zzb");
        assert_eq!(requote_uri("/a%20b"), "/a%20b");
        assert_eq!(requote_uri(&requote_uri("/a b")), "/a%20b");
    }

    /// WHY: An unparsable base cannot be used to resolve a relative target
    /// WHAT: Tests that the failure is reported instead of panicking
    #[test]
    fn test_invalid_base_is_an_error() {
        let result = normalize_redirect_url("/p", "not a url", None);
        assert!(result.is_err());
    }

    /// WHY: The initial request's fragment seeds the carry-over
    /// WHAT: Tests fragment extraction helper
    #[test]
    fn test_fragment_of() {
        assert_eq!(fragment_of("http://a.com/#top"), Some("top"));
        assert_eq!(fragment_of("http://a.com/#"), None);
        assert_eq!(fragment_of("http://a.com/"), None);
    }
}
