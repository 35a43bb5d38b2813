// gateway/src/cookie.rs
use actix_web::HttpRequest;
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix the session-owning application puts in front of signed values.
const SIGNED_PREFIX: &str = "s:";

fn keyed_mac(value: &str, secret: &str) -> Result<HmacSha256, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(value.as_bytes());
    Ok(mac)
}

/// Produce a cookie value in the `s:<id>.<signature>` form, the signature
/// being the unpadded base64 HMAC-SHA256 of `value` keyed by `secret`.
pub fn sign(value: &str, secret: &str) -> Result<String, InvalidLength> {
    let mac = keyed_mac(value, secret)?;
    let signature = base64::encode_config(mac.finalize().into_bytes(), base64::STANDARD_NO_PAD);
    Ok(format!("{}{}.{}", SIGNED_PREFIX, value, signature))
}

/// Verify a signed cookie value against every configured secret and return
/// the session id it carries.
pub fn unsign<'a>(cookie_value: &'a str, secrets: &[String]) -> Option<&'a str> {
    let signed = cookie_value.strip_prefix(SIGNED_PREFIX)?;
    let (value, sig) = signed.rsplit_once('.')?;
    let sig = base64::decode_config(sig, base64::STANDARD_NO_PAD).ok()?;

    let valid = secrets.iter().any(|secret| {
        keyed_mac(value, secret).map_or(false, |mac| mac.verify_slice(&sig).is_ok())
    });

    valid.then_some(value)
}

/// Session id from the request's session cookie, if present and correctly
/// signed.
pub fn session_id(req: &HttpRequest, cookie_name: &str, secrets: &[String]) -> Option<String> {
    let cookie = req.cookie(cookie_name)?;
    match unsign(cookie.value(), secrets) {
        Some(id) => Some(id.to_string()),
        None => {
            tracing::debug!("Ignoring session cookie with an invalid signature");
            None
        }
    }
}
