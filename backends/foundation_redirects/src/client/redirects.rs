//! Redirect chain resolution.
//!
//! WHY: Following redirects is a sequence of dependent decisions: each hop
//! rewrites the previous request (URL, method, body, cookies, proxies,
//! credentials) and the chain must stay bounded.
//!
//! WHAT: [`RedirectResolver`] is an explicit state machine advanced one hop
//! at a time with [`RedirectResolver::advance`]. Each call returns a
//! [`HopOutcome`].
//!
//! HOW: Two modes share the same per-hop rewrite:
//! - caller-driven: the resolver yields [`HopOutcome::NextRequest`] and waits
//!   for [`RedirectResolver::receive`] to hand back the response;
//! - self-driving: after [`RedirectResolver::driving`] the resolver sends each
//!   hop through a [`Transport`] and yields [`HopOutcome::Sent`].
//!
//! The chain ends with [`HopOutcome::Completed`] carrying the final response
//! (its history holds every redirect response, earliest first) or with
//! [`HopOutcome::Failed`].

use std::sync::Arc;

use super::{
    DetachedTransport, PreparedRequest, RedirectError, RedirectSession, Response, SendOptions,
    Transport, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, TRANSFER_ENCODING,
};
use crate::method::{is_redirect_status, preserves_body, rebuild_method, Method};
use crate::proxies::{select_proxy, ProxyMap};
use crate::url::{fragment_of, normalize_redirect_url};

/// Returns the redirect target of `response`, if it is a followed redirect.
///
/// The `Location` value is taken as Latin-1 text and re-read as UTF-8, which
/// recovers non-ASCII targets sent as raw UTF-8 bytes. Values that do not
/// form valid UTF-8 that way are returned unchanged.
#[must_use]
pub fn get_redirect_target(response: &Response) -> Option<String> {
    if !is_redirect_status(response.status()) {
        return None;
    }
    response.location().map(latin1_as_utf8)
}

fn latin1_as_utf8(text: &str) -> String {
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        let Ok(byte) = u8::try_from(u32::from(c)) else {
            return text.to_string();
        };
        bytes.push(byte);
    }
    String::from_utf8(bytes).unwrap_or_else(|_| text.to_string())
}

/// A hop the resolver sent itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopSummary {
    pub method: Method,
    pub url: String,
    pub status: u16,
}

/// Result of one [`RedirectResolver::advance`] call.
#[derive(Debug)]
pub enum HopOutcome {
    /// Send this request and pass its response to
    /// [`RedirectResolver::receive`].
    NextRequest(Box<PreparedRequest>),

    /// The resolver sent a hop and received a response.
    Sent(HopSummary),

    /// No further redirect. The final response carries the chain history.
    Completed(Box<Response>),

    /// The chain ended with an error.
    Failed(RedirectError),
}

enum RedirectState {
    /// A response is in hand for the request that produced it.
    Received(Option<Box<(PreparedRequest, Response)>>),

    /// Waiting for the caller to send the request and return its response.
    Awaiting(Option<Box<PreparedRequest>>),

    Done,
}

/// Follows a redirect chain hop by hop.
pub struct RedirectResolver<T: Transport = DetachedTransport> {
    state: Option<RedirectState>,
    session: Arc<RedirectSession>,
    transport: Option<T>,
    options: SendOptions,
    base_proxies: ProxyMap,
    chain: Vec<Response>,
    fragment: Option<String>,
    limit: usize,
}

impl RedirectResolver<DetachedTransport> {
    /// Starts a caller-driven chain for `response`, the answer to `request`.
    ///
    /// The redirect limit defaults to the session's limit. `options.proxies`
    /// is the base map every hop resolves its proxies from. Proxies picked
    /// up from the environment for one hop are not carried into the next:
    /// each hop starts again from the base map, so a `no_proxy` match on a
    /// later target sends that hop direct.
    #[must_use]
    pub fn new(
        session: Arc<RedirectSession>,
        response: Response,
        request: PreparedRequest,
        options: SendOptions,
    ) -> Self {
        let fragment = fragment_of(&request.url).map(str::to_string);
        let limit = session.max_redirects();
        let base_proxies = options.proxies.clone();

        Self {
            state: Some(RedirectState::Received(Some(Box::new((request, response))))),
            session,
            transport: None,
            options,
            base_proxies,
            chain: Vec::new(),
            fragment,
            limit,
        }
    }
}

impl<T: Transport> RedirectResolver<T> {
    /// Overrides the redirect limit for this chain.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Switches to self-driving mode: every hop is sent through `transport`.
    #[must_use]
    pub fn driving<U: Transport>(self, transport: U) -> RedirectResolver<U> {
        RedirectResolver {
            state: self.state,
            session: self.session,
            transport: Some(transport),
            options: self.options,
            base_proxies: self.base_proxies,
            chain: self.chain,
            fragment: self.fragment,
            limit: self.limit,
        }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Send options as rebuilt for the latest hop.
    #[must_use]
    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    /// Redirect responses consumed so far, earliest first.
    #[must_use]
    pub fn history(&self) -> &[Response] {
        &self.chain
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self.state, None | Some(RedirectState::Done))
    }

    /// Hands back the response to the request from the last
    /// [`HopOutcome::NextRequest`]. Cookies it sets are stored in the session
    /// jar.
    ///
    /// # Errors
    ///
    /// Returns [`RedirectError::InvalidState`] if no request is awaiting a
    /// response.
    pub fn receive(&mut self, response: Response) -> Result<(), RedirectError> {
        match self.state.take() {
            Some(RedirectState::Awaiting(Some(request))) => {
                self.session.extract_cookies(&request, &response);
                self.state = Some(RedirectState::Received(Some(Box::new((
                    *request, response,
                )))));
                Ok(())
            }
            other => {
                self.state = other;
                Err(RedirectError::InvalidState)
            }
        }
    }

    /// Advances the chain by one step. Returns `None` once the chain is over.
    pub fn advance(&mut self) -> Option<HopOutcome> {
        match self.state.take()? {
            RedirectState::Done => {
                self.state = Some(RedirectState::Done);
                None
            }
            RedirectState::Awaiting(_) => {
                tracing::error!("Redirect resolver advanced while awaiting a response");
                self.finish(HopOutcome::Failed(RedirectError::InvalidState))
            }
            RedirectState::Received(inner) => {
                let Some(inner) = inner else {
                    self.state = Some(RedirectState::Done);
                    return None;
                };
                let (request, response) = *inner;
                self.hop(request, response)
            }
        }
    }

    /// Runs a self-driving chain to completion.
    ///
    /// # Errors
    ///
    /// Returns [`RedirectError::NoTransport`] for a caller-driven chain,
    /// otherwise the error that ended the chain.
    pub fn resolve_all(mut self) -> Result<Response, RedirectError> {
        if self.transport.is_none() {
            return Err(RedirectError::NoTransport);
        }

        while let Some(outcome) = self.advance() {
            match outcome {
                HopOutcome::Sent(summary) => {
                    tracing::debug!(
                        "Redirect hop {} {} returned {}",
                        summary.method,
                        summary.url,
                        summary.status
                    );
                }
                HopOutcome::Completed(response) => return Ok(*response),
                HopOutcome::Failed(err) => return Err(err),
                HopOutcome::NextRequest(_) => return Err(RedirectError::InvalidState),
            }
        }

        Err(RedirectError::InvalidState)
    }

    fn finish(&mut self, outcome: HopOutcome) -> Option<HopOutcome> {
        self.state = Some(RedirectState::Done);
        Some(outcome)
    }

    fn hop(&mut self, request: PreparedRequest, mut response: Response) -> Option<HopOutcome> {
        let Some(target) = get_redirect_target(&response) else {
            response.set_history(std::mem::take(&mut self.chain));
            return self.finish(HopOutcome::Completed(Box::new(response)));
        };

        tracing::info!(
            "Redirect {} from {} to {}",
            response.status(),
            response.url(),
            target
        );

        let mut next = request.clone();

        if let Err(err) = response.drain() {
            tracing::error!("Failed to drain redirect body from {}: {}", response.url(), err);
            return self.finish(HopOutcome::Failed(err.into()));
        }

        if self.chain.len() >= self.limit {
            tracing::error!("Exceeded {} redirects at {}", self.limit, response.url());
            response.set_history(std::mem::take(&mut self.chain));
            return self.finish(HopOutcome::Failed(RedirectError::TooManyRedirects {
                limit: self.limit,
                response: Box::new(response),
            }));
        }

        response.close();

        let normalized =
            match normalize_redirect_url(&target, response.url(), self.fragment.as_deref()) {
                Ok(normalized) => normalized,
                Err(err) => {
                    return self.finish(HopOutcome::Failed(RedirectError::InvalidLocation(
                        format!("{target}: {err}"),
                    )));
                }
            };
        tracing::debug!("Normalized redirect target {} to {}", target, normalized.url);
        self.fragment = normalized.fragment;
        next.url = normalized.url;

        let status = response.status();
        let method = rebuild_method(&next.method, status);
        if method != next.method {
            tracing::debug!("Rewriting {} to {} for status {}", next.method, method, status);
        }
        next.method = method;

        if !preserves_body(status) {
            for header in [CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING] {
                next.headers.remove(header);
            }
            next.body = None;
            tracing::debug!("Dropped body and body headers for status {}", status);
        }

        next.headers.remove(COOKIE);
        next.cookies.extract_from_response(&request, &response);
        self.session.merge_cookies_into(next.cookies.as_mut());
        next.prepare_cookies();

        self.options.proxies = self.session.rebuild_proxies(&mut next, &self.base_proxies);
        self.options.proxy = select_proxy(&next.url, &self.options.proxies).cloned();
        if let Some(proxy) = &self.options.proxy {
            tracing::debug!("Routing {} through proxy {}", next.url, proxy.url());
        }

        self.session.rebuild_auth(&mut next, &request.url);

        let declares_body =
            next.headers.contains(CONTENT_LENGTH) || next.headers.contains(TRANSFER_ENCODING);
        if next.body_position.is_some() && declares_body {
            next.rewind_body();
        }

        self.chain.push(response);

        if self.transport.is_none() {
            let emitted = next.clone();
            self.state = Some(RedirectState::Awaiting(Some(Box::new(next))));
            return Some(HopOutcome::NextRequest(Box::new(emitted)));
        }

        if let Err(err) = next.ensure_sendable() {
            return self.finish(HopOutcome::Failed(err));
        }

        let sent = match &self.transport {
            Some(transport) => transport.send(&next, &self.options),
            None => return self.finish(HopOutcome::Failed(RedirectError::NoTransport)),
        };

        match sent {
            Ok(new_response) => {
                self.session.extract_cookies(&next, &new_response);
                let summary = HopSummary {
                    method: next.method.clone(),
                    url: next.url.clone(),
                    status: new_response.status(),
                };
                self.state = Some(RedirectState::Received(Some(Box::new((
                    next,
                    new_response,
                )))));
                Some(HopOutcome::Sent(summary))
            }
            Err(err) => {
                tracing::error!("Failed to send redirect hop to {}: {}", next.url, err);
                self.finish(HopOutcome::Failed(err.into()))
            }
        }
    }
}

impl<T: Transport> Iterator for RedirectResolver<T> {
    type Item = HopOutcome;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}

impl<T: Transport> std::fmt::Debug for RedirectResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectResolver")
            .field("limit", &self.limit)
            .field("hops", &self.chain.len())
            .field("fragment", &self.fragment)
            .field("driving", &self.transport.is_some())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
