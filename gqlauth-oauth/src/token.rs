//! Token endpoint responses.

use serde::{Deserialize, Serialize};

/// Body of a token endpoint response.
///
/// Every field is optional: identity providers leave fields out (or send
/// `null`) on partial failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Bearer token for API calls.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Token exchanged for the next access token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// OIDC ID token.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Refresh token lifetime in seconds.
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    /// Identity provider session id.
    #[serde(default)]
    pub session_state: Option<String>,
    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Keycloak not-before policy.
    #[serde(default, rename = "not-before-policy")]
    pub not_before_policy: Option<i64>,
}

/// OAuth error body (RFC 6749 §5.2).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorBody {
    /// Best human-readable message from an error body.
    pub(crate) fn message_from(body: &str) -> String {
        match serde_json::from_str::<TokenErrorBody>(body) {
            Ok(parsed) => parsed
                .error_description
                .or(parsed.error)
                .unwrap_or_else(|| body.to_string()),
            Err(_) => body.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keycloak_response() {
        let body = serde_json::json!({
            "access_token": "A1",
            "expires_in": 300,
            "refresh_expires_in": 1800,
            "refresh_token": "R1",
            "token_type": "Bearer",
            "id_token": "I1",
            "not-before-policy": 0,
            "session_state": "3f0c",
            "scope": "openid email profile"
        });
        let parsed: TokenResponse = serde_json::from_value(body).unwrap();

        assert_eq!(parsed.access_token.as_deref(), Some("A1"));
        assert_eq!(parsed.refresh_token.as_deref(), Some("R1"));
        assert_eq!(parsed.expires_in, Some(300));
        assert_eq!(parsed.not_before_policy, Some(0));
    }

    #[test]
    fn test_nullable_fields() {
        let parsed: TokenResponse =
            serde_json::from_value(serde_json::json!({"access_token": null})).unwrap();
        assert_eq!(parsed, TokenResponse::default());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            TokenErrorBody::message_from(
                r#"{"error":"invalid_grant","error_description":"Token is not active"}"#
            ),
            "Token is not active"
        );
        assert_eq!(
            TokenErrorBody::message_from(r#"{"error":"invalid_client"}"#),
            "invalid_client"
        );
        assert_eq!(TokenErrorBody::message_from("Bad Gateway"), "Bad Gateway");
    }
}
