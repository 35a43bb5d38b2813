// gateway/src/rewrite.rs
//! Best-effort fixes applied to upstream response headers so the
//! application keeps working when iframed behind the base path.
use actix_web::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use common::models::session::SessionUser;
use url::Url;

use crate::paths;

const CSP_HEADERS: [HeaderName; 2] = [
    header::CONTENT_SECURITY_POLICY,
    header::CONTENT_SECURITY_POLICY_REPORT_ONLY,
];

/// What the rewriter needs to know about the request being answered.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    pub base_path: &'a str,
    /// Host the client addressed, used to resolve relative `Location`s.
    pub host: &'a str,
    pub user: Option<&'a SessionUser>,
}

pub fn rewrite_response_headers(headers: &mut HeaderMap, ctx: &RewriteContext<'_>) {
    headers.remove(header::X_FRAME_OPTIONS);
    for name in CSP_HEADERS {
        strip_frame_ancestors(headers, name);
    }
    rewrite_location(headers, ctx);
}

/// Remove a single directive from a CSP value. Returns `None` when nothing
/// else is left.
pub fn remove_directive(policy: &str, directive: &str) -> Option<String> {
    let kept: Vec<&str> = policy
        .split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .filter(|d| {
            let name = d.split_whitespace().next().unwrap_or_default();
            !name.eq_ignore_ascii_case(directive)
        })
        .collect();
    (!kept.is_empty()).then(|| kept.join("; "))
}

fn strip_frame_ancestors(headers: &mut HeaderMap, name: HeaderName) {
    if !headers.contains_key(&name) {
        return;
    }

    let mut rewritten = Vec::new();
    for value in headers.get_all(&name) {
        match value.to_str() {
            Ok(policy) => {
                if let Some(policy) = remove_directive(policy, "frame-ancestors") {
                    match HeaderValue::from_str(&policy) {
                        Ok(value) => rewritten.push(value),
                        Err(_) => rewritten.push(value.clone()),
                    }
                }
            }
            Err(_) => {
                tracing::debug!("Leaving non-UTF-8 {} header untouched", name);
                rewritten.push(value.clone());
            }
        }
    }

    headers.remove(&name);
    for value in rewritten {
        headers.append(name.clone(), value);
    }
}

fn rewrite_location(headers: &mut HeaderMap, ctx: &RewriteContext<'_>) {
    let Some(current) = headers.get(header::LOCATION) else {
        return;
    };
    let Ok(current) = current.to_str() else {
        tracing::debug!("Leaving non-UTF-8 Location header untouched");
        return;
    };

    let mut location = current.to_string();
    if let Some(normalized) = paths::normalize_location(&location, ctx.base_path) {
        tracing::debug!(from = %location, to = %normalized, "Collapsed duplicated base path in Location");
        location = normalized;
    }

    if let Some(user) = ctx.user {
        if points_to_login(&location, ctx) {
            let landing = format!("{}{}", ctx.base_path, user.role().landing_path());
            tracing::debug!(to = %landing, "Authenticated user bounced to login; sending to landing page");
            location = landing;
        }
    }

    if location != current {
        match HeaderValue::from_str(&location) {
            Ok(value) => {
                headers.insert(header::LOCATION, value);
            }
            Err(e) => tracing::debug!("Keeping original Location header: {}", e),
        }
    }
}

fn points_to_login(location: &str, ctx: &RewriteContext<'_>) -> bool {
    let resolved = Url::parse(&format!("http://{}/", ctx.host)).and_then(|base| base.join(location));
    match resolved {
        Ok(url) => paths::is_login_path(url.path(), ctx.base_path),
        Err(e) => {
            tracing::debug!("Could not resolve Location `{}`: {}", location, e);
            false
        }
    }
}
