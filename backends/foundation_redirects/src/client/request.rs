//! Requests as the redirect engine sees them.
//!
//! WHY: Each hop clones the previous request and rewrites it. The request
//! needs ordered, case-insensitive headers, a body that may be a seekable
//! stream which must be rewound before it is resent, and its own cookie jar.
//!
//! WHAT: [`Headers`], [`Body`]/[`StreamBody`] and [`PreparedRequest`].

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use super::{CookieStore, MemoryCookieJar, RedirectError};
use crate::method::Method;

pub const LOCATION: &str = "Location";
pub const COOKIE: &str = "Cookie";
pub const SET_COOKIE: &str = "Set-Cookie";
pub const AUTHORIZATION: &str = "Authorization";
pub const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";

/// Ordered header list with case-insensitive names.
///
/// [`Headers::insert`] keeps a single value per name; [`Headers::append`]
/// allows repeated names such as `Set-Cookie` on responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing every existing value while keeping
    /// the position of the first one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self
            .entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(index) => {
                self.entries[index].1 = value;
                let mut seen = 0usize;
                self.entries.retain(|(existing, _)| {
                    if existing.eq_ignore_ascii_case(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Adds another value for `name`.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes every value for `name`, returning the first one.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let first = self.get(name).map(str::to_string);
        self.entries
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        first
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// A readable and seekable request body source.
pub trait SeekableStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> SeekableStream for T {}

/// A shared handle to a streaming body.
///
/// Clones of a request share the same stream, so rewinding a follow-up
/// request repositions the stream every clone reads from.
#[derive(Clone)]
pub struct StreamBody {
    inner: Arc<Mutex<Box<dyn SeekableStream>>>,
}

impl StreamBody {
    pub fn new(stream: impl SeekableStream + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(stream))),
        }
    }

    fn with_stream<R>(
        &self,
        f: impl FnOnce(&mut dyn SeekableStream) -> io::Result<R>,
    ) -> io::Result<R> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("body stream lock poisoned"))?;
        f(&mut **guard)
    }

    /// Current read position.
    ///
    /// # Errors
    ///
    /// Returns the stream's error if it cannot report a position.
    pub fn position(&self) -> io::Result<u64> {
        self.with_stream(|stream| stream.stream_position())
    }

    /// Moves the stream back to `position`.
    ///
    /// # Errors
    ///
    /// Returns the stream's error if it cannot seek.
    pub fn seek_to(&self, position: u64) -> io::Result<()> {
        self.with_stream(|stream| stream.seek(SeekFrom::Start(position)).map(|_| ()))
    }

    /// Reads everything from the current position.
    ///
    /// # Errors
    ///
    /// Returns the stream's read error.
    pub fn read_remaining(&self) -> io::Result<Vec<u8>> {
        self.with_stream(|stream| {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf)?;
            Ok(buf)
        })
    }
}

impl std::fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBody").finish_non_exhaustive()
    }
}

/// A request body.
#[derive(Debug, Clone)]
pub enum Body {
    Bytes(Vec<u8>),
    Stream(StreamBody),
}

/// Where a streaming body started, recorded when it was attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPosition {
    /// The stream reported this offset.
    Offset(u64),
    /// The stream could not report its position, so it cannot be rewound.
    Unknown,
}

/// A request ready to be sent, and the basis of every follow-up hop.
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Body>,
    pub body_position: Option<BodyPosition>,
    pub cookies: Box<dyn CookieStore>,
    rewind_failure: Option<String>,
}

impl PreparedRequest {
    pub fn new(method: impl Into<Method>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            body: None,
            body_position: None,
            cookies: Box::new(MemoryCookieJar::new()),
            rewind_failure: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attaches an in-memory body and its `Content-Length`.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.headers.insert(CONTENT_LENGTH, body.len().to_string());
        self.body = Some(Body::Bytes(body));
        self
    }

    /// Attaches a streaming body, remembering its current position so the
    /// stream can be rewound for 307/308 follow-ups. Declares chunked
    /// transfer unless a `Content-Length` is already set.
    #[must_use]
    pub fn with_stream(mut self, stream: StreamBody) -> Self {
        self.body_position = Some(match stream.position() {
            Ok(offset) => BodyPosition::Offset(offset),
            Err(err) => {
                tracing::debug!("Body stream cannot report its position: {}", err);
                BodyPosition::Unknown
            }
        });
        if !self.headers.contains(CONTENT_LENGTH) {
            self.headers.insert(TRANSFER_ENCODING, "chunked");
        }
        self.body = Some(Body::Stream(stream));
        self
    }

    #[must_use]
    pub fn with_cookies(mut self, cookies: Box<dyn CookieStore>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Sets the `Cookie` header from the request's jar, unless one is
    /// already present.
    pub fn prepare_cookies(&mut self) {
        if self.headers.contains(COOKIE) {
            return;
        }
        if let Some(header) = self.cookies.cookie_header(&self.url) {
            self.headers.insert(COOKIE, header);
        }
    }

    /// Rewinds a streaming body to its recorded start position.
    ///
    /// A failure is recorded rather than returned; it surfaces from
    /// [`PreparedRequest::ensure_sendable`] when the request is about to be
    /// sent.
    pub fn rewind_body(&mut self) {
        let Some(Body::Stream(stream)) = &self.body else {
            return;
        };

        let result = match self.body_position {
            Some(BodyPosition::Offset(offset)) => stream
                .seek_to(offset)
                .map_err(|err| format!("seek to {offset} failed: {err}")),
            Some(BodyPosition::Unknown) => {
                Err("stream position was not recorded when the body was attached".to_string())
            }
            None => Ok(()),
        };

        if let Err(reason) = result {
            tracing::debug!("Failed to rewind request body: {}", reason);
            self.rewind_failure = Some(reason);
        }
    }

    /// Checks that the request can be sent as is.
    ///
    /// # Errors
    ///
    /// Returns [`RedirectError::UnrewindableBody`] if an earlier rewind of the
    /// streaming body failed.
    pub fn ensure_sendable(&self) -> Result<(), RedirectError> {
        match &self.rewind_failure {
            Some(reason) => Err(RedirectError::UnrewindableBody(reason.clone())),
            None => Ok(()),
        }
    }

    /// Reads the body for transmission. Streaming bodies are consumed from
    /// their current position.
    ///
    /// # Errors
    ///
    /// Returns the stream's read error.
    pub fn read_body(&self) -> io::Result<Option<Vec<u8>>> {
        match &self.body {
            None => Ok(None),
            Some(Body::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(Body::Stream(stream)) => stream.read_remaining().map(Some),
        }
    }
}

impl Clone for PreparedRequest {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            body_position: self.body_position,
            cookies: self.cookies.clone_box(),
            rewind_failure: self.rewind_failure.clone(),
        }
    }
}

impl std::fmt::Debug for PreparedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("body_position", &self.body_position)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct NoSeek(Cursor<Vec<u8>>);

    impl Read for NoSeek {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for NoSeek {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Err(io::Error::other("not seekable"))
        }
    }

    /// WHY: Header names are case-insensitive and insert keeps one value
    /// WHAT: Tests insert, get, append and remove
    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("content-type", "text/plain");
        headers.insert(CONTENT_TYPE, "application/json");
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(headers.len(), 1);

        headers.append(SET_COOKIE, "a=1");
        headers.append("set-cookie", "b=2");
        assert_eq!(headers.get_all(SET_COOKIE), vec!["a=1", "b=2"]);

        assert_eq!(headers.remove("Set-Cookie").as_deref(), Some("a=1"));
        assert!(!headers.contains(SET_COOKIE));
    }

    /// WHY: Insert must collapse duplicates created by append
    /// WHAT: Tests insert over appended values keeps the first position
    #[test]
    fn test_headers_insert_collapses_duplicates() {
        let mut headers: Headers = [("X-A", "1"), ("X-B", "2"), ("x-a", "3")].into_iter().collect();
        headers.insert("X-A", "4");
        let collected: Vec<_> = headers.iter().collect();
        assert_eq!(collected, vec![("X-A", "4"), ("X-B", "2")]);
    }

    /// WHY: Clones of a request share the stream and rewinding restores it
    /// WHAT: Tests reading, rewinding and re-reading a stream body
    #[test]
    fn test_stream_body_rewind() {
        let stream = StreamBody::new(Cursor::new(b"payload".to_vec()));
        let mut request = PreparedRequest::new("POST", "http://a.com/").with_stream(stream);
        assert_eq!(request.body_position, Some(BodyPosition::Offset(0)));
        assert_eq!(request.headers.get(TRANSFER_ENCODING), Some("chunked"));

        assert_eq!(request.read_body().unwrap(), Some(b"payload".to_vec()));
        assert_eq!(request.read_body().unwrap(), Some(Vec::new()));

        let mut clone = request.clone();
        clone.rewind_body();
        assert!(clone.ensure_sendable().is_ok());
        assert_eq!(request.read_body().unwrap(), Some(b"payload".to_vec()));
    }

    /// WHY: A stream without a position cannot be resent
    /// WHAT: Tests that rewind failure surfaces only from ensure_sendable
    #[test]
    fn test_unrewindable_stream_surfaces_on_send() {
        let stream = StreamBody::new(NoSeek(Cursor::new(b"data".to_vec())));
        let mut request = PreparedRequest::new("PUT", "http://a.com/")
            .with_header(CONTENT_LENGTH, "4")
            .with_stream(stream);
        assert_eq!(request.body_position, Some(BodyPosition::Unknown));
        assert!(!request.headers.contains(TRANSFER_ENCODING));

        request.rewind_body();
        assert!(matches!(
            request.ensure_sendable(),
            Err(RedirectError::UnrewindableBody(_))
        ));
    }

    /// WHY: In-memory bodies declare their length
    /// WHAT: Tests with_body
    #[test]
    fn test_with_body_sets_content_length() {
        let request = PreparedRequest::new("POST", "http://a.com/").with_body("hello");
        assert_eq!(request.headers.get(CONTENT_LENGTH), Some("5"));
        assert_eq!(request.read_body().unwrap(), Some(b"hello".to_vec()));
    }
}
