//! PKCE parameters for the authorization-code flow.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::OAuthConfig;
use gqlauth_core::AuthError;

/// Runtime state for one authorization request.
#[derive(Debug, Clone)]
pub struct PkceContext {
    /// Random state parameter for CSRF protection
    pub state: String,
    /// Nonce echoed back in the ID token
    pub nonce: String,
    /// PKCE code verifier (random string)
    pub code_verifier: String,
    /// PKCE code challenge (SHA256 hash of verifier)
    pub code_challenge: String,
}

impl PkceContext {
    /// Create a context with fresh random parameters.
    pub fn new() -> Self {
        Self::from_verifier(random_hex(32))
    }

    /// Create a context around a known verifier.
    pub fn from_verifier(code_verifier: impl Into<String>) -> Self {
        let code_verifier = code_verifier.into();
        Self {
            state: random_hex(16),
            nonce: random_hex(16),
            code_challenge: code_challenge(&code_verifier),
            code_verifier,
        }
    }

    /// Build the authorization URL the user agent should open.
    pub fn authorization_url(&self, config: &OAuthConfig) -> Result<Url, AuthError> {
        let base = config
            .auth_url
            .as_deref()
            .ok_or_else(|| AuthError::InvalidResponse("no authorization endpoint".to_string()))?;
        let mut url = Url::parse(base)
            .map_err(|e| AuthError::InvalidResponse(format!("bad authorization endpoint: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("scope", &config.scopes)
            .append_pair("code_challenge", &self.code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &self.state)
            .append_pair("nonce", &self.nonce);

        Ok(url)
    }
}

impl Default for PkceContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the S256 code challenge for a verifier.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_challenge() {
        // Appendix B of RFC 7636.
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-1mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_fresh_contexts_differ() {
        let a = PkceContext::new();
        let b = PkceContext::new();
        assert_ne!(a.code_verifier, b.code_verifier);
        assert_ne!(a.state, b.state);
        assert_eq!(a.code_verifier.len(), 64);
    }

    #[test]
    fn test_authorization_url() {
        let config = OAuthConfig::new("mobile", "https://id.example.com/token")
            .with_auth_url("https://id.example.com/auth")
            .with_redirect_uri("app://redirect");
        let ctx = PkceContext::from_verifier("verifier");

        let url = ctx.authorization_url(&config).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_id"], "mobile");
        assert_eq!(pairs["redirect_uri"], "app://redirect");
        assert_eq!(pairs["code_challenge"], code_challenge("verifier"));
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["nonce"], ctx.nonce);
    }

    #[test]
    fn test_authorization_url_requires_endpoint() {
        let config = OAuthConfig::new("mobile", "https://id.example.com/token");
        assert!(PkceContext::new().authorization_url(&config).is_err());
    }
}
