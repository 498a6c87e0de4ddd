//! Identity-token claim decoding and expiry checks.
//!
//! The payload segment is decoded **without signature verification**: the
//! claims feed display state only, never authorization decisions. The
//! backend validates the tokens it receives; this decode is not a trust
//! boundary.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

/// User attributes derived from identity-token claims.
///
/// Non-authoritative by construction (see module docs). Missing claims
/// default to empty strings, matching what the web clients rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    /// Subject claim (`sub`).
    pub user_id: String,
    /// Pool username claim (`cognito:username`).
    pub username: String,
    /// Email claim.
    pub email: String,
    /// Display name claim.
    pub name: String,
    /// Date-of-birth claim (`dob`), if present.
    pub date_of_birth: Option<String>,
}

/// Decodes the claims segment of a JWT. Returns `None` on any malformed
/// input: wrong segment count, bad base64, or a non-object payload.
pub fn decode(token: &str) -> Option<Value> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let claims: Value = serde_json::from_slice(&decoded).ok()?;
    claims.is_object().then_some(claims)
}

/// Whether the token's `exp` claim is in the past.
///
/// Fail-closed: an undecodable token, or one without a numeric `exp`,
/// counts as expired.
pub fn is_expired(token: &str) -> bool {
    let Some(claims) = decode(token) else {
        return true;
    };
    let Some(exp) = claims.get("exp").and_then(Value::as_i64) else {
        return true;
    };
    exp < chrono::Utc::now().timestamp()
}

/// Maps identity-token claims onto a [`UserProfile`].
pub fn extract_profile(token: &str) -> UserProfile {
    let claims = decode(token).unwrap_or(Value::Null);
    let text = |key: &str| {
        claims
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    UserProfile {
        user_id: text("sub"),
        username: text("cognito:username"),
        email: text("email"),
        name: text("name"),
        date_of_birth: claims
            .get("dob")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
