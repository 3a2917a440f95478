//! OAuth configuration.

use std::time::Duration;

/// Default bound for token endpoint requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(8000);

/// Configuration for an OAuth/OIDC identity provider client.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// Token endpoint URL
    pub token_url: String,
    /// Authorization endpoint URL, when authorization URLs are built locally
    pub auth_url: Option<String>,
    /// Redirect URI registered for this client
    pub redirect_uri: String,
    /// OAuth scopes (space-separated)
    pub scopes: String,
    /// Bound for a single token endpoint request
    pub request_timeout: Duration,
}

impl OAuthConfig {
    /// Create a new OAuth configuration.
    pub fn new(client_id: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            token_url: token_url.into(),
            auth_url: None,
            redirect_uri: String::new(),
            scopes: "openid".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set the authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    /// Set the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Set OAuth scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: impl Into<String>) -> Self {
        self.scopes = scopes.into();
        self
    }

    /// Set the token endpoint request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
