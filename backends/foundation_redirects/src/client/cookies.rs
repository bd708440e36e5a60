//! Cookie jar collaborator.
//!
//! WHY: Cookies set by intermediate redirect responses must reach the next
//! hop, and cookies from the session jar must be merged in. An explicit
//! `Cookie` header is never forwarded; it is always rebuilt from the jar.
//!
//! WHAT: The [`CookieStore`] trait the resolver talks to, and
//! [`MemoryCookieJar`], a small in-memory implementation with host and path
//! matching.

use super::{PreparedRequest, Response, SET_COOKIE};

/// A stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lower-cased domain without a leading dot.
    pub domain: String,
    /// True when the cookie was set with a `Domain` attribute and so also
    /// applies to subdomains.
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
}

impl Cookie {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into().trim_start_matches('.').to_ascii_lowercase(),
            include_subdomains: false,
            path: "/".to_string(),
            secure: false,
        }
    }

    /// True if this cookie should be sent with a request to `url`.
    #[must_use]
    pub fn matches(&self, url: &::url::Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        let domain_ok = host == self.domain
            || (self.include_subdomains && host.ends_with(&format!(".{}", self.domain)));
        let path_ok = path_matches(url.path(), &self.path);
        let scheme_ok = !self.secure || url.scheme() == "https";

        domain_ok && path_ok && scheme_ok
    }

    fn same_identity(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    match request_path.strip_prefix(cookie_path) {
        Some(rest) => cookie_path.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

fn default_path(url: &::url::Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

/// Outcome of parsing one `Set-Cookie` header.
enum SetCookie {
    Store(Cookie),
    Expire(Cookie),
}

fn parse_set_cookie(header: &str, request_url: &::url::Url) -> Option<SetCookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let host = request_url.host_str()?.to_ascii_lowercase();
    let mut cookie = Cookie::new(name, value.trim(), host.clone());
    cookie.path = default_path(request_url);
    let mut expired = false;

    for attribute in parts {
        let (key, val) = match attribute.split_once('=') {
            Some((key, val)) => (key.trim(), val.trim()),
            None => (attribute.trim(), ""),
        };

        match key.to_ascii_lowercase().as_str() {
            "domain" if !val.is_empty() => {
                let domain = val.trim_start_matches('.').to_ascii_lowercase();
                if host != domain && !host.ends_with(&format!(".{domain}")) {
                    tracing::debug!("Rejecting cookie {} for foreign domain {}", name, domain);
                    return None;
                }
                cookie.domain = domain;
                cookie.include_subdomains = true;
            }
            "path" if val.starts_with('/') => cookie.path = val.to_string(),
            "max-age" => {
                if val.parse::<i64>().is_ok_and(|age| age <= 0) {
                    expired = true;
                }
            }
            "secure" => cookie.secure = true,
            _ => {}
        }
    }

    Some(if expired {
        SetCookie::Expire(cookie)
    } else {
        SetCookie::Store(cookie)
    })
}

/// A cookie jar the redirect engine can read from and write to.
pub trait CookieStore: Send + Sync {
    /// Stores cookies set by `response`, which answered `request`.
    fn extract_from_response(&mut self, request: &PreparedRequest, response: &Response);

    /// Every stored cookie.
    fn cookies(&self) -> Vec<Cookie>;

    /// Stores `cookie`, replacing one with the same name, domain and path.
    fn set_cookie(&mut self, cookie: Cookie);

    /// Serialized `Cookie` header value for a request to `url`.
    fn cookie_header(&self, url: &str) -> Option<String>;

    fn clone_box(&self) -> Box<dyn CookieStore>;

    /// Copies every cookie of `other` into this jar.
    fn merge(&mut self, other: &dyn CookieStore) {
        for cookie in other.cookies() {
            self.set_cookie(cookie);
        }
    }
}

/// In-memory cookie jar.
#[derive(Debug, Clone, Default)]
pub struct MemoryCookieJar {
    cookies: Vec<Cookie>,
}

impl MemoryCookieJar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.set_cookie(cookie);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    fn remove(&mut self, cookie: &Cookie) {
        self.cookies.retain(|existing| !existing.same_identity(cookie));
    }
}

impl CookieStore for MemoryCookieJar {
    fn extract_from_response(&mut self, request: &PreparedRequest, response: &Response) {
        let Ok(url) = ::url::Url::parse(&request.url) else {
            return;
        };

        for header in response.headers().get_all(SET_COOKIE) {
            match parse_set_cookie(header, &url) {
                Some(SetCookie::Store(cookie)) => self.set_cookie(cookie),
                Some(SetCookie::Expire(cookie)) => self.remove(&cookie),
                None => {}
            }
        }
    }

    fn cookies(&self) -> Vec<Cookie> {
        self.cookies.clone()
    }

    fn set_cookie(&mut self, cookie: Cookie) {
        match self
            .cookies
            .iter_mut()
            .find(|existing| existing.same_identity(&cookie))
        {
            Some(existing) => *existing = cookie,
            None => self.cookies.push(cookie),
        }
    }

    fn cookie_header(&self, url: &str) -> Option<String> {
        let url = ::url::Url::parse(url).ok()?;
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|cookie| cookie.matches(&url))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    fn clone_box(&self) -> Box<dyn CookieStore> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_setting(url: &str, cookies: &[&str]) -> Response {
        let mut response = Response::new(302, url);
        for cookie in cookies {
            response.headers_mut().append(SET_COOKIE, *cookie);
        }
        response
    }

    /// WHY: Cookies set on a redirect must be replayed to the same host
    /// WHAT: Tests extraction and header serialization
    #[test]
    fn test_extract_and_serialize() {
        let request = PreparedRequest::new("GET", "http://a.com/login");
        let response = response_setting(
            "http://a.com/login",
            &["session=abc; Path=/; HttpOnly", "theme=dark"],
        );

        let mut jar = MemoryCookieJar::new();
        jar.extract_from_response(&request, &response);

        assert_eq!(jar.len(), 2);
        assert_eq!(
            jar.cookie_header("http://a.com/home").as_deref(),
            Some("session=abc; theme=dark")
        );
        assert_eq!(jar.cookie_header("http://b.com/home"), None);
    }

    /// WHY: Domain cookies apply to subdomains, host-only cookies do not
    /// WHAT: Tests Domain attribute handling and foreign domain rejection
    #[test]
    fn test_domain_matching() {
        let request = PreparedRequest::new("GET", "http://www.a.com/");
        let response = response_setting(
            "http://www.a.com/",
            &["wide=1; Domain=.a.com", "narrow=2", "evil=3; Domain=b.com"],
        );

        let mut jar = MemoryCookieJar::new();
        jar.extract_from_response(&request, &response);

        assert_eq!(jar.cookie_header("http://api.a.com/").as_deref(), Some("wide=1"));
        assert_eq!(
            jar.cookie_header("http://www.a.com/").as_deref(),
            Some("wide=1; narrow=2")
        );
        assert_eq!(jar.len(), 2);
    }

    /// WHY: Servers delete cookies with a non-positive Max-Age
    /// WHAT: Tests expiry removes the stored cookie
    #[test]
    fn test_max_age_zero_deletes() {
        let request = PreparedRequest::new("GET", "http://a.com/");
        let mut jar = MemoryCookieJar::new();
        jar.extract_from_response(&request, &response_setting("http://a.com/", &["id=1"]));
        assert_eq!(jar.len(), 1);

        jar.extract_from_response(&request, &response_setting("http://a.com/", &["id=; Max-Age=0"]));
        assert!(jar.is_empty());
    }

    /// WHY: Secure cookies and path scoped cookies must not leak
    /// WHAT: Tests secure and path restrictions
    #[test]
    fn test_secure_and_path_restrictions() {
        let mut secure = Cookie::new("token", "t", "a.com");
        secure.secure = true;
        let mut scoped = Cookie::new("admin", "y", "a.com");
        scoped.path = "/admin".to_string();

        let jar = MemoryCookieJar::new().with_cookie(secure).with_cookie(scoped);

        assert_eq!(jar.cookie_header("http://a.com/"), None);
        assert_eq!(jar.cookie_header("https://a.com/").as_deref(), Some("token=t"));
        assert_eq!(
            jar.cookie_header("https://a.com/admin/users").as_deref(),
            Some("token=t; admin=y")
        );
        assert_eq!(jar.cookie_header("https://a.com/administrator").as_deref(), Some("token=t"));
    }

    /// WHY: Merging the session jar must overwrite stale values
    /// WHAT: Tests merge replaces cookies with the same identity
    #[test]
    fn test_merge_overwrites() {
        let mut jar = MemoryCookieJar::new().with_cookie(Cookie::new("a", "old", "a.com"));
        let session = MemoryCookieJar::new()
            .with_cookie(Cookie::new("a", "new", "a.com"))
            .with_cookie(Cookie::new("b", "2", "a.com"));

        jar.merge(&session);
        assert_eq!(jar.cookie_header("http://a.com/").as_deref(), Some("a=new; b=2"));
    }
}
