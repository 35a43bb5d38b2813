// gateway/src/identity.rs
//! Trusted identity assertion sent to the upstream application.
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use common::models::session::SessionUser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// base64(JSON `{username, role}`) of the authenticated user.
pub const IDENTITY_HEADER: &str = "x-gateway-identity";
/// Marks the assertion as set by this gateway.
pub const IDENTITY_SOURCE_HEADER: &str = "x-gateway-identity-source";
pub const IDENTITY_SOURCE: &str = "gateway";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to serialize identity: {0}")]
    Json(#[from] serde_json::Error),
    #[error("identity header is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("identity header contains invalid characters")]
    InvalidHeader(#[from] actix_web::http::header::InvalidHeaderValue),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAssertion {
    pub username: String,
    pub role: String,
}

impl From<&SessionUser> for IdentityAssertion {
    fn from(user: &SessionUser) -> Self {
        Self {
            username: user.username.clone(),
            role: user.role.clone(),
        }
    }
}

pub fn encode(user: &SessionUser) -> Result<String, IdentityError> {
    let json = serde_json::to_vec(&IdentityAssertion::from(user))?;
    Ok(base64::encode(json))
}

pub fn decode(value: &str) -> Result<IdentityAssertion, IdentityError> {
    let json = base64::decode(value.trim())?;
    Ok(serde_json::from_slice(&json)?)
}

/// Header pairs to attach for `user`, or `None` when there is no user or the
/// assertion cannot be encoded.
pub fn assertion_headers(user: Option<&SessionUser>) -> Option<[(&'static str, String); 2]> {
    let user = user?;
    match encode(user) {
        Ok(encoded) => Some([
            (IDENTITY_HEADER, encoded),
            (IDENTITY_SOURCE_HEADER, IDENTITY_SOURCE.to_string()),
        ]),
        Err(e) => {
            tracing::warn!("Forwarding without identity assertion: {}", e);
            None
        }
    }
}

/// True for headers a client must never be able to supply.
pub fn is_identity_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(IDENTITY_HEADER) || name.eq_ignore_ascii_case(IDENTITY_SOURCE_HEADER)
}

/// Replace any identity headers on an outbound request with the gateway's
/// own assertion. Client-supplied values are always dropped.
pub fn apply(headers: &mut HeaderMap, user: Option<&SessionUser>) {
    headers.remove(IDENTITY_HEADER);
    headers.remove(IDENTITY_SOURCE_HEADER);

    let Some(pairs) = assertion_headers(user) else {
        return;
    };
    for (name, value) in pairs {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(name), value);
            }
            Err(e) => {
                tracing::warn!("Forwarding without identity assertion: {}", IdentityError::from(e));
                headers.remove(IDENTITY_HEADER);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trips_user() {
        let user = SessionUser::new("ana@example.com", "manager");
        let mut headers = HeaderMap::new();
        apply(&mut headers, Some(&user));

        let value = headers.get(IDENTITY_HEADER).unwrap().to_str().unwrap();
        assert_eq!(
            decode(value).unwrap(),
            IdentityAssertion {
                username: "ana@example.com".into(),
                role: "manager".into()
            }
        );
        assert_eq!(headers.get(IDENTITY_SOURCE_HEADER).unwrap(), IDENTITY_SOURCE);
    }

    #[test]
    fn test_no_user_no_header() {
        let mut headers = HeaderMap::new();
        apply(&mut headers, None);
        assert!(headers.get(IDENTITY_HEADER).is_none());
        assert!(headers.get(IDENTITY_SOURCE_HEADER).is_none());
    }

    #[test]
    fn test_client_supplied_values_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(IDENTITY_HEADER),
            HeaderValue::from_static("eyJ1c2VybmFtZSI6InJvb3QiLCJyb2xlIjoiYWRtaW4ifQ=="),
        );
        headers.insert(
            HeaderName::from_static(IDENTITY_SOURCE_HEADER),
            HeaderValue::from_static("gateway"),
        );

        apply(&mut headers, None);
        assert!(headers.get(IDENTITY_HEADER).is_none());
        assert!(headers.get(IDENTITY_SOURCE_HEADER).is_none());

        let user = SessionUser::new("ana", "client");
        headers.insert(
            HeaderName::from_static(IDENTITY_HEADER),
            HeaderValue::from_static("spoofed"),
        );
        apply(&mut headers, Some(&user));
        let value = headers.get(IDENTITY_HEADER).unwrap().to_str().unwrap();
        assert_eq!(decode(value).unwrap().username, "ana");
    }

    #[test]
    fn test_identity_header_names() {
        assert!(is_identity_header("X-Gateway-Identity"));
        assert!(is_identity_header("x-gateway-identity-source"));
        assert!(!is_identity_header("x-forwarded-for"));
    }
}
