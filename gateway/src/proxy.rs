// gateway/src/proxy.rs
//! Upstream HTTP transport.
use actix_web::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use actix_web::http::Method;
use actix_web::{web, HttpRequest, HttpResponse};
use common::models::session::SessionUser;
use futures::TryStreamExt;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::identity;
use crate::paths;
use crate::rewrite::{self, RewriteContext};
use crate::state::GatewayState;
use crate::ws;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const KEEP_ALIVE: Duration = Duration::from_secs(15);

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_PREFIX_HEADER: &str = "x-forwarded-prefix";

/// Headers that describe a single hop and must not be relayed.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// HTTP client used for proxying and upstream probes.
///
/// Redirects are passed back to the browser, never followed, and bodies
/// are relayed without decompression.
pub fn build_client(timeout: Duration) -> awc::Client {
    let connector = awc::Connector::new()
        .timeout(CONNECT_TIMEOUT)
        .conn_keep_alive(KEEP_ALIVE);

    awc::ClientBuilder::new()
        .timeout(timeout)
        .disable_redirects()
        .connector(connector)
        .finish()
}

/// Upstream URL for an inbound path + query. Scheme, host and port always
/// come from `app_url`; the inbound request only contributes the path.
pub fn upstream_url(app_url: &Url, path: &str, query: &str, base: &str) -> Result<Url, GatewayError> {
    if app_url.cannot_be_a_base() {
        return Err(GatewayError::InvalidUpstreamUrl(app_url.to_string()));
    }
    let mut url = app_url.clone();
    url.set_path(&paths::rewrite_outbound(path, base));
    url.set_query((!query.is_empty()).then_some(query));
    Ok(url)
}

fn remove_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn request_id(req: &HttpRequest) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Client chain for `X-Forwarded-For`. An inbound chain is only extended
/// when forwarding headers are trusted; otherwise it starts at the peer.
fn forwarded_for(req: &HttpRequest, trusted: bool) -> Option<String> {
    let existing = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .filter(|_| trusted)
        .map(str::to_string);
    let peer = req.peer_addr().map(|addr| addr.ip().to_string());
    match (existing, peer) {
        (Some(existing), Some(peer)) => Some(format!("{}, {}", existing, peer)),
        (existing, peer) => existing.or(peer),
    }
}

/// Outbound request headers, minus anything that must not cross the hop.
///
/// Identity headers supplied by the client are dropped here and replaced by
/// the gateway's own assertion.
pub fn outbound_headers(
    req: &HttpRequest,
    state: &GatewayState,
    user: Option<&SessionUser>,
    request_id: &str,
) -> HeaderMap {
    let mut headers = req.headers().clone();
    remove_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    if !state.config.trust_forwarded_headers {
        headers.remove(header::FORWARDED);
    }

    let scheme = state.request_scheme(req);
    let host = state.request_host(req);
    let mut set = |name: &'static str, value: &str| {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    };
    if let Some(xff) = forwarded_for(req, state.config.trust_forwarded_headers) {
        set("x-forwarded-for", &xff);
    }
    set("x-forwarded-proto", &scheme);
    set("x-forwarded-host", &host);
    if !state.base_path().is_empty() {
        set(FORWARDED_PREFIX_HEADER, state.base_path());
    }
    set(REQUEST_ID_HEADER, request_id);

    identity::apply(&mut headers, user);
    headers
}

/// Forward a request that passed the SSO gate and relay the answer.
#[tracing::instrument(
    name = "proxy",
    skip_all,
    fields(method = %req.method(), path = %req.path(), request_id = tracing::field::Empty)
)]
pub async fn forward(
    req: HttpRequest,
    payload: web::Payload,
    client: &awc::Client,
    state: &GatewayState,
    user: Option<SessionUser>,
) -> Result<HttpResponse, GatewayError> {
    let request_id = request_id(&req);
    tracing::Span::current().record("request_id", request_id.as_str());

    let base = state.base_path();
    let url = upstream_url(&state.config.app_url, req.path(), req.query_string(), base)?;
    let headers = outbound_headers(&req, state, user.as_ref(), &request_id);

    if ws::is_upgrade(&req) {
        let pairs = headers
            .iter()
            .filter(|(name, _)| *name != header::SEC_WEBSOCKET_KEY && *name != header::SEC_WEBSOCKET_VERSION)
            .filter(|(name, _)| *name != header::SEC_WEBSOCKET_EXTENSIONS && *name != header::SEC_WEBSOCKET_PROTOCOL)
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
            .collect();
        return ws::bridge(&req, payload, url, pairs, request_id);
    }

    tracing::debug!(upstream = %url, "Forwarding request");

    let mut upstream_req = client.request(req.method().clone(), url.as_str()).no_decompress();
    for (name, value) in headers.iter() {
        upstream_req = upstream_req.append_header((name.clone(), value.clone()));
    }

    // Only attach a body stream where one is expected; some upstreams wait
    // for a body that never comes otherwise.
    let sent = match *req.method() {
        Method::GET | Method::HEAD | Method::OPTIONS | Method::DELETE => upstream_req.send(),
        _ => upstream_req.send_stream(payload),
    };

    let upstream_res = sent.await.map_err(|e| {
        let err = GatewayError::from(e);
        tracing::error!("Upstream request failed: {}", err);
        err
    })?;

    tracing::debug!(status = %upstream_res.status(), "Upstream responded");

    let mut response_headers = upstream_res.headers().clone();
    remove_hop_by_hop(&mut response_headers);
    response_headers.remove(header::CONTENT_LENGTH);
    let echoed: Vec<HeaderName> = response_headers
        .keys()
        .filter(|name| identity::is_identity_header(name.as_str()))
        .cloned()
        .collect();
    for name in echoed {
        response_headers.remove(name);
    }

    let host = state.request_host(&req);
    let ctx = RewriteContext {
        base_path: base,
        host: &host,
        user: user.as_ref(),
    };
    rewrite::rewrite_response_headers(&mut response_headers, &ctx);

    let mut client_res = HttpResponse::build(upstream_res.status());
    for (name, value) in response_headers.iter() {
        client_res.append_header((name.clone(), value.clone()));
    }
    client_res.insert_header((REQUEST_ID_HEADER, request_id.clone()));

    // Dropping this stream (client went away) drops the upstream connection.
    let body = upstream_res.inspect_err(move |e| {
        tracing::warn!(request_id = %request_id, "Upstream body stream error: {}", e);
    });
    Ok(client_res.streaming(body))
}
