// gateway/src/paths.rs
//! Base-path handling shared by the inbound middleware, the SSO gate, the
//! proxy path rewrite and the response rewriter.
use url::Url;

/// First path segments that belong to the framework or static assets and
/// are forwarded untouched.
const ASSET_ROOTS: [&str; 3] = ["_next", "assets", "favicon"];

/// Collapse a leading `base + base` (at a segment boundary) down to a single
/// `base`, repeating until no duplicate remains.
///
/// `/app/app/login` becomes `/app/login`; `/app/application` is left alone.
/// The result is always a suffix of `path`, so no allocation is needed.
pub fn normalize<'a>(path: &'a str, base: &str) -> &'a str {
    if base.is_empty() {
        return path;
    }
    let mut current = path;
    while let Some(once) = current.strip_prefix(base) {
        match once.strip_prefix(base) {
            Some(rest) if is_boundary(rest) => current = once,
            _ => break,
        }
    }
    current
}

fn is_boundary(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with(['/', '?', '#'])
}

/// True when `path` is served under `base`. `base` and `base/` are the same
/// route.
pub fn has_base_prefix(path: &str, base: &str) -> bool {
    if base.is_empty() {
        return true;
    }
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Strip `base` when present. The bare base maps to `/`.
pub fn strip_base<'a>(path: &'a str, base: &str) -> &'a str {
    if base.is_empty() || !has_base_prefix(path, base) {
        return path;
    }
    match &path[base.len()..] {
        "" => "/",
        rest => rest,
    }
}

/// De-duplicate the base path of a `Location` value in place semantics.
///
/// Accepts an origin-relative path or an absolute URL (only the path part
/// is touched). Returns `None` when nothing changed or the value is not
/// something we understand.
pub fn normalize_location(value: &str, base: &str) -> Option<String> {
    if base.is_empty() {
        return None;
    }
    if value.starts_with('/') && !value.starts_with("//") {
        let normalized = normalize(value, base);
        return (normalized.len() != value.len()).then(|| normalized.to_string());
    }
    let mut url = Url::parse(value).ok()?;
    let path = url.path().to_string();
    let normalized = normalize(&path, base);
    if normalized.len() == path.len() {
        return None;
    }
    let normalized = normalized.to_string();
    url.set_path(&normalized);
    Some(url.into())
}

/// `/login` or `{base}/login` after normalization; a trailing slash is
/// tolerated.
pub fn is_login_path(path: &str, base: &str) -> bool {
    let path = normalize(path, base);
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    if path == "/login" {
        return true;
    }
    !base.is_empty()
        && path
            .strip_prefix(base)
            .map_or(false, |rest| rest == "/login")
}

/// Whether the first segment (after an optional base prefix) is a framework
/// or static asset root.
pub fn is_asset_path(path: &str, base: &str) -> bool {
    is_asset_rooted(path) || (has_base_prefix(path, base) && is_asset_rooted(strip_base(path, base)))
}

fn is_asset_rooted(path: &str) -> bool {
    let first = path
        .strip_prefix('/')
        .unwrap_or(path)
        .split(['/', '?'])
        .next()
        .unwrap_or_default();
    ASSET_ROOTS.iter().any(|root| {
        if *root == "favicon" {
            first.starts_with(root)
        } else {
            first == *root
        }
    })
}

/// Collapse a run of leading slashes to one, so the result can never read
/// as a network-path reference (`//host/...`).
pub fn collapse_leading_slashes(path: &str) -> &str {
    let rest = path.trim_start_matches('/');
    if path.len() - rest.len() > 1 {
        &path[path.len() - rest.len() - 1..]
    } else {
        path
    }
}

/// Upstream path for a proxied request.
///
/// Asset roots are forwarded as-is; every other path carries the base path
/// exactly once. The result never starts with `//`.
pub fn rewrite_outbound(path: &str, base: &str) -> String {
    let path = normalize(collapse_leading_slashes(path), base);
    if base.is_empty() || is_asset_path(path, base) || has_base_prefix(path, base) {
        return path.to_string();
    }
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_repeated_prefix() {
        assert_eq!(normalize("/app/app/login", "/app"), "/app/login");
        assert_eq!(normalize("/app/app/app/app/x?y=1", "/app"), "/app/x?y=1");
        assert_eq!(normalize("/app/app", "/app"), "/app");
        assert_eq!(normalize("/app/app/", "/app"), "/app/");
    }

    #[test]
    fn test_respects_segment_boundary() {
        assert_eq!(normalize("/app/application", "/app"), "/app/application");
        assert_eq!(normalize("/app/app-settings", "/app"), "/app/app-settings");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let base = "/app";
        for path in [
            "/",
            "/app",
            "/app/",
            "/app/app",
            "/app/app/app/",
            "/app/app/dashboard?tab=1",
            "/appapp",
            "/other/app/app",
            "",
        ] {
            let once = normalize(path, base);
            assert_eq!(normalize(once, base), once, "{path}");
        }
    }

    #[test]
    fn test_empty_base_is_noop() {
        for path in ["/", "/app/app/login", "//x", ""] {
            assert_eq!(normalize(path, ""), path);
        }
    }

    #[test]
    fn test_base_prefix_trailing_slash_equivalence() {
        assert!(has_base_prefix("/app", "/app"));
        assert!(has_base_prefix("/app/", "/app"));
        assert!(has_base_prefix("/app/x", "/app"));
        assert!(!has_base_prefix("/apple", "/app"));
        assert_eq!(strip_base("/app", "/app"), "/");
        assert_eq!(strip_base("/app/", "/app"), "/");
    }

    #[test]
    fn test_location_relative_and_absolute() {
        assert_eq!(
            normalize_location("/app/app/login", "/app").as_deref(),
            Some("/app/login")
        );
        assert_eq!(
            normalize_location("https://example.com/app/app/app/client?x=1", "/app").as_deref(),
            Some("https://example.com/app/client?x=1")
        );
        assert_eq!(normalize_location("/app/login", "/app"), None);
        assert_eq!(normalize_location("::not a url::", "/app"), None);
        assert_eq!(normalize_location("/app/app/login", ""), None);
    }

    #[test]
    fn test_login_path_variants() {
        assert!(is_login_path("/login", "/app"));
        assert!(is_login_path("/app/login", "/app"));
        assert!(is_login_path("/app/app/login", "/app"));
        assert!(is_login_path("/app/app/app/login/", "/app"));
        assert!(!is_login_path("/app/loginx", "/app"));
        assert!(!is_login_path("/client/login", "/app"));
        assert!(is_login_path("/login", ""));
    }

    #[test]
    fn test_asset_paths() {
        assert!(is_asset_path("/_next/static/chunks/main.js", "/app"));
        assert!(is_asset_path("/app/_next/static/chunks/main.js", "/app"));
        assert!(is_asset_path("/favicon.ico", "/app"));
        assert!(is_asset_path("/app/assets/logo.svg", "/app"));
        assert!(!is_asset_path("/app/dashboard", "/app"));
        assert!(!is_asset_path("/nextish", "/app"));
    }

    #[test]
    fn test_outbound_rewrite() {
        assert_eq!(rewrite_outbound("/dashboard", "/app"), "/app/dashboard");
        assert_eq!(rewrite_outbound("/app/dashboard", "/app"), "/app/dashboard");
        assert_eq!(rewrite_outbound("/app/app/dashboard", "/app"), "/app/dashboard");
        assert_eq!(rewrite_outbound("/app", "/app"), "/app");
        assert_eq!(rewrite_outbound("/_next/static/a.js", "/app"), "/_next/static/a.js");
        assert_eq!(rewrite_outbound("/app/_next/static/a.js", "/app"), "/app/_next/static/a.js");
        assert_eq!(rewrite_outbound("/favicon.ico", "/app"), "/favicon.ico");
        assert_eq!(rewrite_outbound("/dashboard", ""), "/dashboard");
    }

    #[test]
    fn test_outbound_never_duplicates_base() {
        for path in ["/", "/x", "/app", "/app/app/app/x", "/assets/a", "/app/app/_next/x"] {
            let out = rewrite_outbound(path, "/app");
            assert!(!out.starts_with("/app/app/") && out != "/app/app", "{path} -> {out}");
        }
    }

    #[test]
    fn test_outbound_never_network_path() {
        assert_eq!(collapse_leading_slashes("//evil.example/x"), "/evil.example/x");
        assert_eq!(collapse_leading_slashes("/x"), "/x");
        assert_eq!(collapse_leading_slashes("x"), "x");
        assert_eq!(rewrite_outbound("//favicon.evil.example/x", "/app"), "/favicon.evil.example/x");
        assert_eq!(rewrite_outbound("///evil.example/x", ""), "/evil.example/x");
        assert_eq!(rewrite_outbound("//evil.example/x", "/app"), "/app/evil.example/x");
        assert!(!is_asset_path("//_next/x", ""));
    }
}
