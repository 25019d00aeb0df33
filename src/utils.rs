// For token verification
use hmac::{Hmac, Mac};
use sha2::Sha256;
type HmacSha256 = Hmac<Sha256>;

/// Checks a caller-supplied token against the configured secret.
///
/// Absent, empty and whitespace-only tokens never match, and nothing matches an
/// empty secret. The comparison runs in constant time over HMAC-SHA256 digests
/// keyed by the secret.
pub fn verify_token(secret: &str, token: Option<&str>) -> bool {
    let token = match token {
        Some(t) if !t.trim().is_empty() => t,
        _ => return false,
    };
    if secret.is_empty() {
        return false;
    }

    let digest = |value: &str| {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(value.as_bytes());
        Some(mac)
    };

    let (Some(expected), Some(supplied)) = (digest(secret), digest(token)) else {
        return false;
    };
    supplied
        .verify_slice(&expected.finalize().into_bytes())
        .is_ok()
}

/// Log label for a supplied token. Only presence and length are revealed.
pub fn describe_token(token: Option<&str>) -> String {
    match token {
        None => "<none>".to_string(),
        Some("") => "<empty>".to_string(),
        Some(t) => format!("<{} chars>", t.chars().count()),
    }
}
