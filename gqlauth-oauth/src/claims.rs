//! Identity claims carried by an access or ID token.
//!
//! Tokens are decoded without signature verification. The claims only feed
//! the person upsert; the API verifies the token itself.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use gqlauth_core::AuthError;
use serde::{Deserialize, Serialize};

/// `aud` claim: a single audience or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// Single audience.
    One(String),
    /// Several audiences.
    Many(Vec<String>),
}

impl Audience {
    /// Whether `value` is among the audiences.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(aud) => aud == value,
            Self::Many(auds) => auds.iter().any(|aud| aud == value),
        }
    }
}

/// OIDC claims used by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject identifier at the identity provider.
    pub sub: String,
    /// Given name.
    #[serde(default)]
    pub given_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub family_name: Option<String>,
    /// E-mail address.
    #[serde(default)]
    pub email: Option<String>,
    /// Full name.
    #[serde(default)]
    pub name: Option<String>,
    /// Preferred username.
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<Audience>,
    /// Authorized party.
    #[serde(default)]
    pub azp: Option<String>,
    /// Expiry (seconds since epoch).
    #[serde(default)]
    pub exp: Option<i64>,
    /// Issued at (seconds since epoch).
    #[serde(default)]
    pub iat: Option<i64>,
    /// Authentication time (seconds since epoch).
    #[serde(default)]
    pub auth_time: Option<i64>,
    /// Nonce echoed from the authorization request.
    #[serde(default)]
    pub nonce: Option<String>,
    /// Identity provider session.
    #[serde(default)]
    pub session_state: Option<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    /// Any other claims.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IdentityClaims {
    /// Decode the payload segment of a JWT without verifying it.
    pub fn decode_unverified(token: &str) -> Result<Self, AuthError> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next()) {
            (Some(_header), Some(payload), Some(_signature)) if segments.next().is_none() => {
                payload
            }
            _ => {
                return Err(AuthError::InvalidToken(
                    "expected three dot-separated segments".to_string(),
                ))
            }
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::InvalidToken(format!("payload is not base64url: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::InvalidToken(format!("payload is not a claims object: {}", e)))
    }

    /// Whether the token had expired at `now` (seconds since epoch).
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp.is_some_and(|exp| exp <= now)
    }
}

#[cfg(test)]
pub(crate) fn unsigned_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_keycloak_claims() {
        let token = unsigned_jwt(&serde_json::json!({
            "sub": "f1b2",
            "given_name": "Ada",
            "family_name": "Lovelace",
            "email": "ada@example.com",
            "aud": ["account", "mobile"],
            "exp": 1_700_000_300,
            "realm_access": {"roles": ["user"]},
            "typ": "Bearer"
        }));

        let claims = IdentityClaims::decode_unverified(&token).unwrap();
        assert_eq!(claims.sub, "f1b2");
        assert_eq!(claims.given_name.as_deref(), Some("Ada"));
        assert_eq!(claims.family_name.as_deref(), Some("Lovelace"));
        assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
        assert!(claims.aud.as_ref().unwrap().contains("mobile"));
        assert!(claims.extra.contains_key("realm_access"));
        assert!(claims.is_expired_at(1_700_000_300));
        assert!(!claims.is_expired_at(1_700_000_299));
    }

    #[test]
    fn test_single_audience() {
        let token = unsigned_jwt(&serde_json::json!({"sub": "s", "aud": "mobile"}));
        let claims = IdentityClaims::decode_unverified(&token).unwrap();
        assert_eq!(claims.aud, Some(Audience::One("mobile".into())));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            IdentityClaims::decode_unverified("A1"),
            Err(AuthError::InvalidToken(_))
        ));
        assert!(matches!(
            IdentityClaims::decode_unverified("a.!!!.c"),
            Err(AuthError::InvalidToken(_))
        ));

        let no_sub = unsigned_jwt(&serde_json::json!({"email": "x@example.com"}));
        assert!(IdentityClaims::decode_unverified(&no_sub).is_err());
    }
}
