//! Token endpoint client.

use std::time::Duration;

use async_trait::async_trait;
use gqlauth_core::AuthError;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::OAuthConfig;
use crate::form::form_url_encode;
use crate::token::{TokenErrorBody, TokenResponse};

/// Exchanges a refresh token for a new token set.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Perform one `grant_type=refresh_token` exchange.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;
}

fn map_reqwest(err: reqwest::Error) -> AuthError {
    if err.is_timeout() {
        AuthError::Timeout
    } else if err.is_decode() {
        AuthError::InvalidResponse(err.to_string())
    } else {
        AuthError::Network(err.to_string())
    }
}

/// Client for an identity provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: Client,
    config: OAuthConfig,
}

impl TokenClient {
    /// Create a client with its own HTTP client bounded by the request timeout.
    pub fn new(config: OAuthConfig) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(map_reqwest)?;
        Ok(Self { http, config })
    }

    /// Create with a custom reqwest client.
    pub fn with_client(http: Client, config: OAuthConfig) -> Self {
        Self { http, config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, AuthError> {
        debug!(token_url = %self.config.token_url, "Exchanging authorization code");
        let body = form_url_encode(&[
            ("client_id", Some(self.config.client_id.as_str())),
            ("redirect_uri", Some(self.config.redirect_uri.as_str())),
            ("code", Some(code)),
            ("grant_type", Some("authorization_code")),
            ("code_verifier", code_verifier),
        ]);
        self.post_form(body).await
    }

    /// Exchange a refresh token for a new token set.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        debug!(token_url = %self.config.token_url, "Refreshing access token");
        let body = form_url_encode(&[
            ("client_id", Some(self.config.client_id.as_str())),
            ("refresh_token", Some(refresh_token)),
            ("grant_type", Some("refresh_token")),
        ]);
        self.post_form(body).await
    }

    async fn post_form(&self, body: String) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .timeout(self.config.request_timeout)
            .body(body)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = TokenErrorBody::message_from(&body);
            warn!(status = status.as_u16(), %message, "Token endpoint rejected request");
            return Err(AuthError::token_endpoint(status.as_u16(), message));
        }

        response.json::<TokenResponse>().await.map_err(map_reqwest)
    }
}

#[async_trait]
impl TokenRefresher for TokenClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.refresh_token(refresh_token).await
    }
}

/// Subset of an OpenID Connect discovery document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier.
    pub issuer: String,
    /// Authorization endpoint.
    pub authorization_endpoint: String,
    /// Token endpoint.
    pub token_endpoint: String,
    /// Userinfo endpoint.
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    /// End-session endpoint.
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

impl DiscoveryDocument {
    /// Fetch `<issuer>/.well-known/openid-configuration`.
    pub async fn fetch(http: &Client, issuer: &str) -> Result<Self, AuthError> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        debug!(%url, "Fetching discovery document");

        let response = http
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::token_endpoint(status.as_u16(), body));
        }

        response.json::<Self>().await.map_err(map_reqwest)
    }

    /// Fetch the document with a one-off HTTP client bounded by `timeout`.
    pub async fn discover(issuer: &str, timeout: Duration) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(map_reqwest)?;
        Self::fetch(&http, issuer).await
    }

    /// Build an [`OAuthConfig`] for a client of this provider.
    pub fn to_config(&self, client_id: impl Into<String>) -> OAuthConfig {
        OAuthConfig::new(client_id, self.token_endpoint.clone())
            .with_auth_url(self.authorization_endpoint.clone())
    }
}
