// gateway/src/state.rs
use actix_web::http::header;
use actix_web::HttpRequest;
use common::models::session::SessionUser;
use common::GatewayConfig;
use std::sync::Arc;

use crate::cookie;
use crate::store::SessionStore;

/// Shared, process-wide gateway state.
#[derive(Debug, Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub sessions: SessionStore,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, sessions: SessionStore) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.config.base_path
    }

    /// The authenticated user behind the request's session cookie, if any.
    pub async fn resolve_user(&self, req: &HttpRequest) -> Option<SessionUser> {
        let session_id = cookie::session_id(req, &self.config.session_name, &self.config.session_secrets)?;
        self.sessions.get(&session_id).await?.user
    }

    /// Host the client addressed. `Forwarded` / `X-Forwarded-Host` are only
    /// believed when the operator says a trusted proxy sets them.
    pub fn request_host(&self, req: &HttpRequest) -> String {
        if self.config.trust_forwarded_headers {
            return req.connection_info().host().to_string();
        }
        direct_host(req).to_string()
    }

    pub fn request_scheme(&self, req: &HttpRequest) -> String {
        if self.config.trust_forwarded_headers {
            return req.connection_info().scheme().to_string();
        }
        let scheme = if req.app_config().secure() { "https" } else { "http" };
        scheme.to_string()
    }

    /// Absolute URL of the request as the client sees it.
    pub fn request_url(&self, req: &HttpRequest) -> String {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        format!(
            "{}://{}{}",
            self.request_scheme(req),
            self.request_host(req),
            path_and_query
        )
    }

    /// `{base}{landing}` for the given user, the client landing when anonymous.
    pub fn landing_for(&self, user: Option<&SessionUser>) -> String {
        let landing = user
            .map(|u| u.role().landing_path())
            .unwrap_or(common::models::session::Role::Client.landing_path());
        format!("{}{}", self.config.base_path, landing)
    }
}

/// `Host` header, else the request target's authority, else the server's
/// configured host. Never reads forwarding headers.
fn direct_host(req: &HttpRequest) -> &str {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .unwrap_or_else(|| req.app_config().host())
}
