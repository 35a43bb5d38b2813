// gateway/src/health.rs
use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use serde_json::json;
use std::time::{Duration, Instant};

use crate::state::GatewayState;

/// Bound for each upstream probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const SERVICE_NAME: &str = "gateway";
/// Fixed string identifying this build in `/_diag`.
pub const SIGNATURE: &str = concat!("edge-gateway/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub name: &'static str,
    pub url: String,
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl ProbeResult {
    /// Anything short of a server error means the upstream is answering.
    pub fn is_up(&self) -> bool {
        self.status.map_or(false, |s| (200..500).contains(&s))
    }
}

/// Liveness of the gateway itself; always 200.
#[get("/healthz")]
pub async fn healthz(state: web::Data<GatewayState>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "ok": true,
        "service": SERVICE_NAME,
        "storeReady": state.sessions.readiness().is_ready(),
    }))
}

async fn probe(client: &awc::Client, name: &'static str, url: String) -> ProbeResult {
    let started = Instant::now();
    let outcome = client.head(url.as_str()).timeout(PROBE_TIMEOUT).send().await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(res) => ProbeResult {
            name,
            url,
            status: Some(res.status().as_u16()),
            latency_ms,
            error: None,
        },
        Err(e) => {
            tracing::warn!("Upstream probe `{}` failed: {}", name, e);
            ProbeResult {
                name,
                url,
                status: None,
                latency_ms,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Reachability of the upstream application: its root and its static
/// chunk directory, probed concurrently.
#[get("/_app_health")]
pub async fn app_health(
    state: web::Data<GatewayState>,
    client: web::Data<awc::Client>,
) -> impl Responder {
    let app_url = state.config.app_url.as_str().trim_end_matches('/');
    let root_url = format!("{}/", app_url);
    let chunks_url = format!("{}{}/_next/static/chunks/", app_url, state.base_path());

    let (root, chunks) = futures::join!(
        probe(&client, "root", root_url),
        probe(&client, "chunks", chunks_url),
    );

    let ok = root.is_up() || chunks.is_up();
    let body = json!({ "ok": ok, "checks": [root, chunks] });
    if ok {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::BadGateway().json(body)
    }
}

/// Configuration echo for telling deployments apart.
#[get("/_diag")]
pub async fn diag(state: web::Data<GatewayState>) -> impl Responder {
    let config = &state.config;
    HttpResponse::Ok().json(json!({
        "signature": SIGNATURE,
        "basePath": config.base_path,
        "appUrl": config.app_url.as_str(),
        "portalHost": config.portal_host,
        "ssoDisabled": config.disable_sso,
        "sessionStore": state.sessions.kind(),
        "sessionDomain": config.session_domain,
        "environment": config.environment,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: Option<u16>) -> ProbeResult {
        ProbeResult {
            name: "root",
            url: "http://app/".into(),
            status,
            latency_ms: 1,
            error: None,
        }
    }

    #[test]
    fn test_probe_status_classification() {
        assert!(result(Some(200)).is_up());
        assert!(result(Some(404)).is_up());
        assert!(!result(Some(500)).is_up());
        assert!(!result(None).is_up());
    }

    #[test]
    fn test_probe_result_serializes_camel_case() {
        let value = serde_json::to_value(result(Some(204))).unwrap();
        assert_eq!(value["latencyMs"], 1);
        assert_eq!(value["status"], 204);
    }
}
