// gateway/src/sso.rs
//! Per-request single sign-on policy.
//!
//! A request walks a fixed chain of transitions; the first one that claims
//! it decides the final [`SsoState`]. Requests nobody claims are sent to the
//! portal's login page.
use common::models::session::SessionUser;
use common::{GatewayConfig, PORTAL_DISABLED};
use url::Url;

use crate::paths;

const HEALTH_PATHS: [&str; 2] = ["/healthz", "/_app_health"];
const ASSET_PREFIXES: [&str; 4] = ["/_next/", "/static/", "/assets/", "/favicon"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisabledReason {
    /// `DISABLE_SSO` is set.
    Flag,
    /// No portal host, or the `disabled` sentinel.
    PortalUnset,
    /// The portal is this gateway; redirecting would loop.
    PortalIsSelf,
    /// The portal host does not form a valid URL.
    PortalMalformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsoState {
    HealthCheck,
    PublicAsset,
    LoginPath,
    Authenticated,
    SsoDisabled(DisabledReason),
    RedirectToPortal { location: String },
}

impl SsoState {
    pub fn name(&self) -> &'static str {
        match self {
            SsoState::HealthCheck => "health_check",
            SsoState::PublicAsset => "public_asset",
            SsoState::LoginPath => "login_path",
            SsoState::Authenticated => "authenticated",
            SsoState::SsoDisabled(_) => "sso_disabled",
            SsoState::RedirectToPortal { .. } => "redirect_to_portal",
        }
    }

    /// Whether the request may continue to the upstream.
    pub fn allows(&self) -> bool {
        !matches!(self, SsoState::RedirectToPortal { .. })
    }
}

/// Everything the gate looks at, resolved before evaluation.
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub path: &'a str,
    /// `Host` as the client sent it (may include a port).
    pub host: &'a str,
    /// Full URL of the original request, used as the return-to target.
    pub request_url: &'a str,
    pub user: Option<&'a SessionUser>,
    pub config: &'a GatewayConfig,
}

type Transition = fn(&GateInput<'_>) -> Option<SsoState>;

const TRANSITIONS: [Transition; 5] = [
    health_check,
    public_asset,
    login_path,
    authenticated,
    sso_disabled,
];

pub fn evaluate(input: &GateInput<'_>) -> SsoState {
    TRANSITIONS
        .iter()
        .find_map(|transition| transition(input))
        .unwrap_or_else(|| redirect_to_portal(input))
}

fn health_check(input: &GateInput<'_>) -> Option<SsoState> {
    HEALTH_PATHS
        .contains(&input.path)
        .then_some(SsoState::HealthCheck)
}

fn public_asset(input: &GateInput<'_>) -> Option<SsoState> {
    let base = input.config.base_path.as_str();
    let rooted = |path: &str| ASSET_PREFIXES.iter().any(|prefix| path.starts_with(prefix));
    let under_base = paths::has_base_prefix(input.path, base) && rooted(paths::strip_base(input.path, base));
    (rooted(input.path) || under_base).then_some(SsoState::PublicAsset)
}

fn login_path(input: &GateInput<'_>) -> Option<SsoState> {
    paths::is_login_path(input.path, &input.config.base_path).then_some(SsoState::LoginPath)
}

fn authenticated(input: &GateInput<'_>) -> Option<SsoState> {
    input.user.map(|_| SsoState::Authenticated)
}

fn sso_disabled(input: &GateInput<'_>) -> Option<SsoState> {
    portal_login_url(input.config, input.host, input.request_url)
        .err()
        .map(SsoState::SsoDisabled)
}

fn redirect_to_portal(input: &GateInput<'_>) -> SsoState {
    match portal_login_url(input.config, input.host, input.request_url) {
        Ok(url) => SsoState::RedirectToPortal {
            location: url.into(),
        },
        Err(reason) => SsoState::SsoDisabled(reason),
    }
}

/// The portal login URL for a request, or why SSO does not apply to it.
///
/// `https://{portal}/login?sso=1&returnTo={request_url}`; a portal host
/// configured with an explicit scheme keeps that scheme.
pub fn portal_login_url(
    config: &GatewayConfig,
    request_host: &str,
    request_url: &str,
) -> Result<Url, DisabledReason> {
    if config.disable_sso {
        return Err(DisabledReason::Flag);
    }
    let portal = match config.portal_host.as_deref().map(str::trim) {
        None | Some("") => return Err(DisabledReason::PortalUnset),
        Some(p) if p.eq_ignore_ascii_case(PORTAL_DISABLED) => return Err(DisabledReason::PortalUnset),
        Some(p) => p.trim_end_matches('/'),
    };

    let mut url = if portal.contains("://") {
        Url::parse(portal)
    } else {
        Url::parse(&format!("https://{}", portal))
    }
    .map_err(|_| DisabledReason::PortalMalformed)?;

    let Some(portal_host) = url.host_str() else {
        return Err(DisabledReason::PortalMalformed);
    };
    if portal_host.eq_ignore_ascii_case(hostname(request_host)) {
        return Err(DisabledReason::PortalIsSelf);
    }

    url.set_path("/login");
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("sso", "1")
        .append_pair("returnTo", request_url);
    Ok(url)
}

/// Host without port; bracketed IPv6 literals keep their brackets.
fn hostname(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_once(']').map_or(host, |(ip, _)| &host[..ip.len() + 1]);
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(portal: Option<&str>, disable_sso: bool) -> GatewayConfig {
        GatewayConfig {
            portal_host: portal.map(str::to_string),
            disable_sso,
            ..GatewayConfig::default()
        }
    }

    fn input<'a>(
        config: &'a GatewayConfig,
        path: &'a str,
        host: &'a str,
        user: Option<&'a SessionUser>,
    ) -> GateInput<'a> {
        GateInput {
            path,
            host,
            request_url: "https://gateway.example.com/dashboard",
            user,
            config,
        }
    }

    #[test]
    fn test_disable_flag_passes_anonymous_through() {
        let config = config(Some("portal.example.com"), true);
        let state = evaluate(&input(&config, "/admin", "gateway.example.com", None));
        assert_eq!(state, SsoState::SsoDisabled(DisabledReason::Flag));
        assert!(state.allows());
    }

    #[test]
    fn test_portal_equal_to_request_host_is_disabled() {
        let config = config(Some("portal.example.com"), false);
        let state = evaluate(&input(&config, "/dashboard", "portal.example.com", None));
        assert_eq!(state, SsoState::SsoDisabled(DisabledReason::PortalIsSelf));

        let state = evaluate(&input(&config, "/dashboard", "Portal.Example.com:443", None));
        assert_eq!(state, SsoState::SsoDisabled(DisabledReason::PortalIsSelf));
    }

    #[test]
    fn test_anonymous_request_redirects_to_portal() {
        let config = config(Some("portal.example.com"), false);
        let state = evaluate(&input(&config, "/dashboard", "gateway.example.com", None));
        assert_eq!(
            state,
            SsoState::RedirectToPortal {
                location: "https://portal.example.com/login?sso=1&returnTo=https%3A%2F%2Fgateway.example.com%2Fdashboard"
                    .to_string()
            }
        );
        assert!(!state.allows());
    }

    #[test]
    fn test_authenticated_request_passes() {
        let config = config(Some("portal.example.com"), false);
        let user = SessionUser::new("ana", "client");
        let state = evaluate(&input(&config, "/app/client", "gateway.example.com", Some(&user)));
        assert_eq!(state, SsoState::Authenticated);
    }

    #[test]
    fn test_assets_and_login_short_circuit_before_session() {
        let config = config(Some("portal.example.com"), false);
        for path in ["/_next/static/chunks/app.js", "/app/_next/data/x.json", "/favicon.ico", "/app/assets/logo.png", "/static/x.css"] {
            assert_eq!(evaluate(&input(&config, path, "gateway.example.com", None)), SsoState::PublicAsset, "{path}");
        }
        for path in ["/login", "/app/login", "/app/app/login"] {
            assert_eq!(evaluate(&input(&config, path, "gateway.example.com", None)), SsoState::LoginPath, "{path}");
        }
        assert_eq!(evaluate(&input(&config, "/healthz", "gateway.example.com", None)), SsoState::HealthCheck);
    }

    #[test]
    fn test_unset_sentinel_and_malformed_portal() {
        let unset = config(None, false);
        assert_eq!(
            evaluate(&input(&unset, "/x", "gateway.example.com", None)),
            SsoState::SsoDisabled(DisabledReason::PortalUnset)
        );

        let sentinel = config(Some("DISABLED"), false);
        assert_eq!(
            evaluate(&input(&sentinel, "/x", "gateway.example.com", None)),
            SsoState::SsoDisabled(DisabledReason::PortalUnset)
        );

        let malformed = config(Some("bad host name"), false);
        assert_eq!(
            evaluate(&input(&malformed, "/x", "gateway.example.com", None)),
            SsoState::SsoDisabled(DisabledReason::PortalMalformed)
        );
    }

    #[test]
    fn test_portal_with_scheme_is_honoured() {
        let config = config(Some("http://portal.local:8000/"), false);
        let url = portal_login_url(&config, "gateway.local", "http://gateway.local/app").unwrap();
        assert_eq!(
            url.as_str(),
            "http://portal.local:8000/login?sso=1&returnTo=http%3A%2F%2Fgateway.local%2Fapp"
        );
    }

    #[test]
    fn test_hostname_strips_port() {
        assert_eq!(hostname("example.com:8080"), "example.com");
        assert_eq!(hostname("example.com"), "example.com");
        assert_eq!(hostname("[::1]:8080"), "[::1]");
    }
}
