//! Responses and their body collaborator.
//!
//! WHY: A superseded redirect response must have its body drained and closed
//! so the underlying connection can be reused, even when decoding that body
//! fails.
//!
//! WHAT: [`ResponseBody`] abstracts the transport-owned body stream;
//! [`BytesBody`] is an in-memory implementation. [`Response`] carries the
//! status, headers, body and the redirect history of a chain.

use super::{BodyError, Headers, LOCATION};
use crate::method::is_redirect_status;

/// A transport-owned response body.
pub trait ResponseBody: Send {
    /// Reads the full body, applying content decoding.
    ///
    /// # Errors
    ///
    /// Returns [`BodyError`] when the framing or content encoding is broken.
    fn read_decoded(&mut self) -> Result<Vec<u8>, BodyError>;

    /// Reads the remaining raw bytes without any decoding.
    ///
    /// # Errors
    ///
    /// Returns [`BodyError::Io`] when the stream fails.
    fn read_raw(&mut self) -> Result<Vec<u8>, BodyError>;

    /// Releases the underlying connection.
    fn close(&mut self);

    fn is_closed(&self) -> bool;
}

/// An in-memory body, optionally failing to decode.
#[derive(Debug, Clone, Default)]
pub struct BytesBody {
    data: Vec<u8>,
    consumed: bool,
    closed: bool,
    decode_failure: Option<BodyError>,
}

impl BytesBody {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// A body whose decoded read fails with `error`; its raw bytes remain
    /// readable.
    pub fn failing_decode(data: impl Into<Vec<u8>>, error: BodyError) -> Self {
        Self {
            data: data.into(),
            decode_failure: Some(error),
            ..Self::default()
        }
    }

    fn take(&mut self) -> Result<Vec<u8>, BodyError> {
        if self.closed {
            return Err(BodyError::Io("body already closed".to_string()));
        }
        if self.consumed {
            return Ok(Vec::new());
        }
        self.consumed = true;
        Ok(std::mem::take(&mut self.data))
    }
}

impl ResponseBody for BytesBody {
    fn read_decoded(&mut self) -> Result<Vec<u8>, BodyError> {
        if let Some(err) = self.decode_failure.clone() {
            return Err(err);
        }
        self.take()
    }

    fn read_raw(&mut self) -> Result<Vec<u8>, BodyError> {
        self.take()
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A response received for one hop.
pub struct Response {
    status: u16,
    url: String,
    headers: Headers,
    body: Box<dyn ResponseBody>,
    content: Option<Vec<u8>>,
    history: Vec<Response>,
}

impl Response {
    pub fn new(status: u16, url: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: Headers::new(),
            body: Box::new(BytesBody::default()),
            content: None,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Box::new(BytesBody::new(body));
        self
    }

    #[must_use]
    pub fn with_body_reader(mut self, body: Box<dyn ResponseBody>) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The `Location` header, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION)
    }

    /// True for a followed redirect status carrying a `Location` header.
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        is_redirect_status(self.status) && self.location().is_some()
    }

    /// Redirect responses that led to this one, earliest first.
    #[must_use]
    pub fn history(&self) -> &[Response] {
        &self.history
    }

    pub(crate) fn set_history(&mut self, history: Vec<Response>) {
        self.history = history;
    }

    /// The decoded body, read once and cached.
    ///
    /// # Errors
    ///
    /// Returns the body's decoding error.
    pub fn content(&mut self) -> Result<&[u8], BodyError> {
        if self.content.is_none() {
            self.content = Some(self.body.read_decoded()?);
        }
        Ok(self.content.as_deref().unwrap_or_default())
    }

    /// Consumes the remaining body so its connection can be released.
    ///
    /// Framing and decoding failures are logged and recovered by reading
    /// and discarding the raw bytes instead.
    ///
    /// # Errors
    ///
    /// Returns the error of the raw read when the stream itself fails.
    pub fn drain(&mut self) -> Result<(), BodyError> {
        if self.content.is_some() {
            return Ok(());
        }
        match self.body.read_decoded() {
            Ok(content) => self.content = Some(content),
            Err(err) => {
                tracing::warn!("Discarding undecodable body from {}: {}", self.url, err);
                self.body.read_raw()?;
            }
        }
        Ok(())
    }

    /// Releases the connection behind the body.
    pub fn close(&mut self) {
        self.body.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.body.is_closed()
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}
