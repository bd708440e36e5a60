//! Redirect chain integration tests.
//!
//! WHY: The per-hop rules only matter in combination: method rewriting,
//! body handling, credential stripping, cookie carry-over and proxy
//! reselection all act on the same follow-up request.
//!
//! WHAT: End-to-end chains in both caller-driven and self-driving mode.
//!
//! HOW: A `ScriptedTransport` replays canned responses and records every
//! request it was asked to send. Sessions use a static environment so no
//! test depends on the process environment.

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::Arc;

use foundation_redirects::client::{
    BodyError, BytesBody, HopOutcome, PreparedRequest, RedirectError, RedirectResolver,
    RedirectSession, Response, ScriptedResponse, ScriptedTransport, SendOptions, StreamBody,
    AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION, PROXY_AUTHORIZATION,
    SET_COOKIE, TRANSFER_ENCODING,
};
use foundation_redirects::method::Method;
use foundation_redirects::proxies::{
    NoSystemBypass, ProxyBypassResolver, ProxyMap, StaticEnvironment,
};
use tracing_test::traced_test;

fn session_with_env(env: StaticEnvironment) -> RedirectSession {
    RedirectSession::new().with_bypass_resolver(ProxyBypassResolver::new(
        Arc::new(env),
        Arc::new(NoSystemBypass),
    ))
}

fn isolated_session() -> RedirectSession {
    session_with_env(StaticEnvironment::new())
}

struct NoSeek(Cursor<Vec<u8>>);

impl Read for NoSeek {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Seek for NoSeek {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::other("pipe is not seekable"))
    }
}

// ========================================================================
// Chain limits
// ========================================================================

/// WHY: A chain must stop once it reaches its limit
/// WHAT: Tests that the 4th redirect with a limit of 3 fails with that response
#[test]
#[traced_test]
fn test_fourth_redirect_exceeds_limit_of_three() {
    let session = Arc::new(isolated_session().with_max_redirects(3));
    let transport = ScriptedTransport::new([
        ScriptedResponse::redirect(302, "/1"),
        ScriptedResponse::redirect(302, "/2"),
        ScriptedResponse::redirect(302, "/3"),
        ScriptedResponse::redirect(302, "/4"),
        ScriptedResponse::new(200),
    ]);

    let result = session.send(
        &transport,
        PreparedRequest::new("GET", "http://a.com/0"),
        SendOptions::new(),
    );

    let Err(RedirectError::TooManyRedirects { limit, response }) = result else {
        panic!("expected TooManyRedirects");
    };
    assert_eq!(limit, 3);
    assert_eq!(response.url(), "http://a.com/3");
    assert_eq!(response.location(), Some("/4"));
    assert_eq!(response.history().len(), 3);
    assert_eq!(transport.sent().len(), 4);
    assert_eq!(transport.remaining(), 1);
    assert!(logs_contain("Exceeded 3 redirects"));
}

/// WHY: The default limit is generous enough for ordinary chains
/// WHAT: Tests a five hop chain completes with full history
#[test]
fn test_chain_within_default_limit_completes() {
    let session = Arc::new(isolated_session());
    let mut script: Vec<ScriptedResponse> = (1..=5)
        .map(|hop| ScriptedResponse::redirect(301, format!("/hop{hop}")))
        .collect();
    script.push(ScriptedResponse::new(200).with_body("landed"));
    let transport = ScriptedTransport::new(script);

    let mut response = session
        .send(
            &transport,
            PreparedRequest::new("GET", "http://a.com/"),
            SendOptions::new(),
        )
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.url(), "http://a.com/hop5");
    assert_eq!(response.content().unwrap(), b"landed");
    let history: Vec<&str> = response.history().iter().map(Response::url).collect();
    assert_eq!(
        history,
        vec![
            "http://a.com/",
            "http://a.com/hop1",
            "http://a.com/hop2",
            "http://a.com/hop3",
            "http://a.com/hop4"
        ]
    );
    assert!(response.history().iter().all(Response::is_closed));
}

// ========================================================================
// Method and body rewriting
// ========================================================================

/// WHY: See Other turns a form POST into a GET without a body
/// WHAT: Tests method rewrite and body header removal on 303
#[test]
fn test_see_other_switches_post_to_get_and_drops_body() {
    let session = Arc::new(isolated_session());
    let transport = ScriptedTransport::new([
        ScriptedResponse::redirect(303, "/result"),
        ScriptedResponse::new(200),
    ]);

    let request = PreparedRequest::new("POST", "http://a.com/form")
        .with_header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .with_body("name=value");
    session.send(&transport, request, SendOptions::new()).unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0].method, Method::Post);
    assert_eq!(sent[0].body.as_deref(), Some(&b"name=value"[..]));

    assert_eq!(sent[1].method, Method::Get);
    assert_eq!(sent[1].url, "http://a.com/result");
    assert_eq!(sent[1].body, None);
    assert!(!sent[1].headers.contains(CONTENT_LENGTH));
    assert!(!sent[1].headers.contains(CONTENT_TYPE));
}

/// WHY: 307 must repeat the request exactly, including a streamed body
/// WHAT: Tests that the stream is rewound and resent with its headers
#[test]
fn test_temporary_redirect_rewinds_and_resends_stream() {
    let session = Arc::new(isolated_session());
    let transport = ScriptedTransport::new([
        ScriptedResponse::redirect(307, "/upload-v2"),
        ScriptedResponse::new(201),
    ]);

    let stream = StreamBody::new(Cursor::new(b"stream-body".to_vec()));
    let request = PreparedRequest::new("PUT", "http://a.com/upload").with_stream(stream);
    let response = session.send(&transport, request, SendOptions::new()).unwrap();
    assert_eq!(response.status(), 201);

    let sent = transport.sent();
    assert_eq!(sent[1].method, Method::Put);
    assert_eq!(sent[1].url, "http://a.com/upload-v2");
    assert_eq!(sent[1].headers.get(TRANSFER_ENCODING), Some("chunked"));
    assert_eq!(sent[0].body.as_deref(), Some(&b"stream-body"[..]));
    assert_eq!(sent[1].body.as_deref(), Some(&b"stream-body"[..]));
}

/// WHY: A body that cannot be rewound must not be resent truncated
/// WHAT: Tests UnrewindableBody surfaces when the follow-up is sent
#[test]
fn test_unrewindable_stream_fails_on_resend() {
    let session = Arc::new(isolated_session());
    let transport = ScriptedTransport::new([
        ScriptedResponse::redirect(308, "/elsewhere"),
        ScriptedResponse::new(200),
    ]);

    let stream = StreamBody::new(NoSeek(Cursor::new(b"once".to_vec())));
    let request = PreparedRequest::new("POST", "http://a.com/")
        .with_header(CONTENT_LENGTH, "4")
        .with_stream(stream);

    let result = session.send(&transport, request, SendOptions::new());
    assert!(matches!(result, Err(RedirectError::UnrewindableBody(_))));
    assert_eq!(transport.sent().len(), 1);
}

// ========================================================================
// Credentials and cookies
// ========================================================================

/// WHY: Credentials survive a TLS upgrade but never reach another host
/// WHAT: Tests Authorization across http -> https -> other host
#[test]
fn test_authorization_kept_on_upgrade_and_stripped_on_host_change() {
    let session = Arc::new(isolated_session());
    let transport = ScriptedTransport::new([
        ScriptedResponse::redirect(301, "https://a.com/secure"),
        ScriptedResponse::redirect(302, "https://b.com/other"),
        ScriptedResponse::new(200),
    ]);

    let request =
        PreparedRequest::new("GET", "http://a.com/").with_header(AUTHORIZATION, "Bearer token");
    session.send(&transport, request, SendOptions::new()).unwrap();

    let sent = transport.sent();
    assert_eq!(sent[1].url, "https://a.com/secure");
    assert_eq!(sent[1].headers.get(AUTHORIZATION), Some("Bearer token"));
    assert_eq!(sent[2].url, "https://b.com/other");
    assert!(!sent[2].headers.contains(AUTHORIZATION));
}

/// WHY: Cookies set mid-chain must be replayed, explicit Cookie headers must not
/// WHAT: Tests cookie carry-over and the session jar after the chain
#[test]
fn test_cookies_from_redirects_are_carried_forward() {
    let session = Arc::new(isolated_session());
    let transport = ScriptedTransport::new([
        ScriptedResponse::redirect(302, "/dashboard").with_header(SET_COOKIE, "sid=abc; Path=/"),
        ScriptedResponse::new(200),
    ]);

    let request = PreparedRequest::new("GET", "http://a.com/login").with_header(COOKIE, "manual=1");
    session.send(&transport, request, SendOptions::new()).unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0].headers.get(COOKIE), Some("manual=1"));
    assert_eq!(sent[1].headers.get(COOKIE), Some("sid=abc"));
    assert_eq!(
        session.cookies().cookie_header("http://a.com/").as_deref(),
        Some("sid=abc")
    );
}

/// WHY: Cookies for one host must not follow a redirect to another
/// WHAT: Tests that the jar only serializes matching cookies
#[test]
fn test_cookies_do_not_cross_hosts() {
    let session = Arc::new(isolated_session());
    let transport = ScriptedTransport::new([
        ScriptedResponse::redirect(302, "http://b.com/").with_header(SET_COOKIE, "sid=abc"),
        ScriptedResponse::new(200),
    ]);

    session
        .send(
            &transport,
            PreparedRequest::new("GET", "http://a.com/"),
            SendOptions::new(),
        )
        .unwrap();

    assert!(!transport.sent()[1].headers.contains(COOKIE));
}

// ========================================================================
// Proxies
// ========================================================================

/// WHY: Each hop may need a different proxy and different proxy credentials
/// WHAT: Tests proxy reselection and Proxy-Authorization per hop
#[test]
fn test_proxy_is_reselected_per_hop() {
    let proxies = ProxyMap::new()
        .with("http://b.com", "http://proxy-b:3128")
        .with("http", "http://user:pw@proxy-http:3128");
    let session = Arc::new(isolated_session().with_trust_env(false).with_proxies(proxies));
    let transport = ScriptedTransport::new([
        ScriptedResponse::redirect(302, "http://b.com/"),
        ScriptedResponse::redirect(302, "http://c.com/"),
        ScriptedResponse::new(200),
    ]);

    session
        .send(
            &transport,
            PreparedRequest::new("GET", "http://a.com/"),
            SendOptions::new(),
        )
        .unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0].proxy.as_deref(), Some("http://user:pw@proxy-http:3128"));
    assert_eq!(sent[1].proxy.as_deref(), Some("http://proxy-b:3128"));
    assert_eq!(sent[2].proxy.as_deref(), Some("http://user:pw@proxy-http:3128"));
    assert_eq!(
        sent[1].headers.get(PROXY_AUTHORIZATION),
        Some("Basic dXNlcjpwdw==")
    );
}

/// WHY: A redirect into a no_proxy domain must leave the proxy behind
/// WHAT: Tests environment proxies and environment no_proxy across hops
#[test]
fn test_environment_no_proxy_applies_to_redirect_target() {
    let env = StaticEnvironment::new()
        .with("http_proxy", "http://env-proxy:3128")
        .with("no_proxy", "internal.example");
    let session = Arc::new(session_with_env(env));
    let transport = ScriptedTransport::new([
        ScriptedResponse::redirect(302, "http://api.internal.example/"),
        ScriptedResponse::new(200),
    ]);

    session
        .send(
            &transport,
            PreparedRequest::new("GET", "http://public.example/"),
            SendOptions::new(),
        )
        .unwrap();

    let sent = transport.sent();
    assert_eq!(sent[0].proxy.as_deref(), Some("http://env-proxy:3128"));
    assert_eq!(sent[1].proxy, None);
}

// ========================================================================
// Resolver modes
// ========================================================================

/// WHY: Callers that own the transport drive the chain themselves
/// WHAT: Tests NextRequest/receive hops with fragment carry-over
#[test]
fn test_caller_driven_chain_carries_fragment() {
    let session = Arc::new(isolated_session());
    let request = PreparedRequest::new("GET", "http://a.com/start#section");
    let first = Response::new(302, "http://a.com/start").with_header(LOCATION, "/moved");

    let mut resolver = session.resolve_redirects(first, request, SendOptions::new());

    let Some(HopOutcome::NextRequest(next)) = resolver.advance() else {
        panic!("expected a follow-up request");
    };
    assert_eq!(next.url, "http://a.com/moved#section");
    resolver
        .receive(Response::new(301, next.url.clone()).with_header(LOCATION, "http://b.com/x#other"))
        .unwrap();

    let Some(HopOutcome::NextRequest(next)) = resolver.advance() else {
        panic!("expected a second follow-up request");
    };
    assert_eq!(next.url, "http://b.com/x#other");
    resolver.receive(Response::new(200, next.url.clone())).unwrap();

    let Some(HopOutcome::Completed(response)) = resolver.advance() else {
        panic!("expected completion");
    };
    assert_eq!(response.history().len(), 2);
    assert!(resolver.advance().is_none());
}

/// WHY: A self-driving resolver is also a plain iterator over hops
/// WHAT: Tests the outcome sequence of a driven chain
#[test]
fn test_driven_resolver_iterates_hops() {
    let session = Arc::new(isolated_session());
    let transport = ScriptedTransport::new([
        ScriptedResponse::redirect(302, "/c"),
        ScriptedResponse::new(204),
    ]);
    let first = Response::new(301, "http://a.com/a").with_header(LOCATION, "/b");

    let outcomes: Vec<HopOutcome> = RedirectResolver::new(
        session,
        first,
        PreparedRequest::new("GET", "http://a.com/a"),
        SendOptions::new(),
    )
    .driving(&transport)
    .collect();

    assert_eq!(outcomes.len(), 3);
    let HopOutcome::Sent(summary) = &outcomes[0] else {
        panic!("expected a sent hop");
    };
    assert_eq!(summary.url, "http://a.com/b");
    assert_eq!(summary.status, 302);
    assert!(matches!(outcomes[1], HopOutcome::Sent(_)));
    let HopOutcome::Completed(response) = &outcomes[2] else {
        panic!("expected completion");
    };
    assert_eq!(response.status(), 204);
    assert_eq!(response.history().len(), 2);
}

/// WHY: A body that fails to decode must not stop the chain
/// WHAT: Tests that the broken redirect body is discarded and closed
#[test]
fn test_undecodable_redirect_body_is_discarded() {
    let session = Arc::new(isolated_session());
    let transport = ScriptedTransport::new([ScriptedResponse::new(200)]);
    let first = Response::new(302, "http://a.com/")
        .with_header(LOCATION, "/next")
        .with_body_reader(Box::new(BytesBody::failing_decode(
            b"\x1f\x8b broken".to_vec(),
            BodyError::ContentDecoding("invalid gzip header".into()),
        )));

    let response = RedirectResolver::new(
        session,
        first,
        PreparedRequest::new("GET", "http://a.com/"),
        SendOptions::new(),
    )
    .driving(&transport)
    .resolve_all()
    .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.history()[0].is_closed());
}

/// WHY: Transport failures end the chain with the transport error
/// WHAT: Tests a script that runs out mid-chain
#[test]
fn test_transport_failure_ends_chain() {
    let session = Arc::new(isolated_session());
    let transport = ScriptedTransport::new([ScriptedResponse::redirect(302, "/again")]);

    let result = session.send(
        &transport,
        PreparedRequest::new("GET", "http://a.com/"),
        SendOptions::new(),
    );
    assert!(matches!(result, Err(RedirectError::Transport(_))));
}
