// gateway/src/routes.rs
use actix_web::http::{header, Method};
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use common::models::session::SessionUser;
use serde_json::json;

use crate::error::GatewayError;
use crate::health;
use crate::paths;
use crate::proxy;
use crate::sso::{self, GateInput, SsoState};
use crate::state::GatewayState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health::healthz)
        .service(health::app_health)
        .service(health::diag)
        .service(whoami)
        .service(root)
        .default_service(web::to(gateway));
}

fn found(location: impl Into<String>) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location.into()))
        .finish()
}

#[get("/whoami")]
pub async fn whoami(req: HttpRequest, state: web::Data<GatewayState>) -> impl Responder {
    let user = state.resolve_user(&req).await;
    HttpResponse::Ok().json(json!({
        "authenticated": user.is_some(),
        "role": user.as_ref().map(|u| u.role.clone()),
        "username": user.as_ref().map(|u| u.username.clone()),
    }))
}

#[get("/")]
pub async fn root(req: HttpRequest, state: web::Data<GatewayState>) -> impl Responder {
    let user = state.resolve_user(&req).await;
    found(state.landing_for(user.as_ref()))
}

/// Login entry points. Known users go home, anonymous users go to the
/// portal, and without SSO the upstream renders its own login.
async fn login(
    req: HttpRequest,
    payload: web::Payload,
    state: &GatewayState,
    client: &awc::Client,
    user: Option<SessionUser>,
) -> Result<HttpResponse, GatewayError> {
    if user.is_some() {
        return Ok(found(state.landing_for(user.as_ref())));
    }
    match sso::portal_login_url(&state.config, &state.request_host(&req), &state.request_url(&req)) {
        Ok(portal) => Ok(found(portal)),
        Err(reason) => {
            tracing::debug!(?reason, "SSO inactive; letting upstream render login");
            proxy::forward(req, payload, client, state, None).await
        }
    }
}

/// Catch-all: session lookup, SSO gate, then the upstream.
async fn gateway(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<GatewayState>,
    client: web::Data<awc::Client>,
) -> Result<HttpResponse, GatewayError> {
    let user = state.resolve_user(&req).await;

    if req.method() == Method::GET && paths::is_login_path(req.path(), state.base_path()) {
        return login(req, payload, &state, &client, user).await;
    }

    let host = state.request_host(&req);
    let url = state.request_url(&req);
    let decision = sso::evaluate(&GateInput {
        path: req.path(),
        host: &host,
        request_url: &url,
        user: user.as_ref(),
        config: &state.config,
    });
    tracing::debug!(path = %req.path(), state = decision.name(), "SSO gate");

    match decision {
        SsoState::RedirectToPortal { location } => Ok(found(location)),
        _ => proxy::forward(req, payload, &client, &state, user).await,
    }
}
