//! Transport collaborator.
//!
//! WHY: The redirect engine decides what to send, not how. Sockets, TLS and
//! pooling belong to whatever implements [`Transport`].
//!
//! WHAT: The [`Transport`] trait, per-send [`SendOptions`] with tagged TLS
//! settings, the [`DetachedTransport`] placeholder for caller-driven chains,
//! and [`ScriptedTransport`], an in-memory transport replaying canned
//! responses for tests and examples.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::{Headers, PreparedRequest, Response, TransportError};
use crate::method::Method;
use crate::proxies::{ProxyMap, ProxyValue};

/// Server certificate verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerify {
    #[default]
    Enabled,
    Disabled,
    /// Verify against the certificates in this bundle.
    CaBundle(PathBuf),
}

/// Client certificate presented during the TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCert {
    /// A single file holding both certificate and key.
    Single(PathBuf),
    Pair { cert: PathBuf, key: PathBuf },
}

/// Settings applied to every hop's send.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Applied to each hop independently.
    pub timeout: Option<Duration>,
    /// Proxy map for the chain, rebuilt per hop.
    pub proxies: ProxyMap,
    /// Proxy selected for the request about to be sent.
    pub proxy: Option<ProxyValue>,
    pub verify: TlsVerify,
    pub cert: Option<ClientCert>,
}

impl SendOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_proxies(mut self, proxies: ProxyMap) -> Self {
        self.proxies = proxies;
        self
    }

    #[must_use]
    pub fn with_verify(mut self, verify: TlsVerify) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub fn with_cert(mut self, cert: ClientCert) -> Self {
        self.cert = Some(cert);
        self
    }
}

/// Sends one request and returns its response.
pub trait Transport {
    /// # Errors
    ///
    /// Returns [`TransportError`] when the exchange fails.
    fn send(
        &self,
        request: &PreparedRequest,
        options: &SendOptions,
    ) -> Result<Response, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(
        &self,
        request: &PreparedRequest,
        options: &SendOptions,
    ) -> Result<Response, TransportError> {
        (**self).send(request, options)
    }
}

/// A transport that cannot send. Used by chains where the caller performs
/// every send itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedTransport;

impl Transport for DetachedTransport {
    fn send(
        &self,
        _request: &PreparedRequest,
        _options: &SendOptions,
    ) -> Result<Response, TransportError> {
        Err(TransportError::Detached)
    }
}

/// A canned response for [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    status: u16,
    headers: Headers,
    body: Vec<u8>,
}

impl ScriptedResponse {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// A redirect with the given status and `Location`.
    #[must_use]
    pub fn redirect(status: u16, location: impl Into<String>) -> Self {
        Self::new(status).with_header(super::LOCATION, location)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// What a [`ScriptedTransport`] observed for one send.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    pub proxy: Option<String>,
}

/// Replays scripted responses in order, recording every request it sends.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedResponse>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Requests sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: &PreparedRequest,
        options: &SendOptions,
    ) -> Result<Response, TransportError> {
        let body = request
            .read_body()
            .map_err(|err| TransportError::BodyUnavailable(err.to_string()))?;

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentRequest {
                method: request.method.clone(),
                url: request.url.clone(),
                headers: request.headers.clone(),
                body,
                proxy: options.proxy.as_ref().map(|p| p.url().to_string()),
            });

        let Some(scripted) = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        else {
            return Err(TransportError::ConnectionFailed(format!(
                "no scripted response left for {}",
                request.url
            )));
        };

        tracing::debug!("Scripted {} for {} {}", scripted.status, request.method, request.url);

        let mut response = Response::new(scripted.status, request.url.clone()).with_body(scripted.body);
        for (name, value) in scripted.headers.iter() {
            response.headers_mut().append(name, value);
        }
        Ok(response)
    }
}
