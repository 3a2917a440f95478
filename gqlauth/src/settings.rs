//! Client settings from the environment.

use gqlauth_core::DEFAULT_ROLE;
use gqlauth_link::HttpLinkConfig;
use gqlauth_oauth::{DiscoveryDocument, OAuthConfig, DEFAULT_REQUEST_TIMEOUT};
use gqlauth_streaming::ChannelConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "GQLAUTH_";

/// Endpoints and identifiers needed to build a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// OAuth client id.
    pub client_id: String,
    /// Issuer whose discovery document supplied the endpoints.
    #[serde(default)]
    pub issuer_url: Option<Url>,
    /// Token endpoint.
    pub token_url: Url,
    /// Authorization endpoint, if login URLs are built by this client.
    #[serde(default)]
    pub auth_url: Option<Url>,
    /// Redirect URI registered for the client. Kept as text since app
    /// schemes like `app://redirect` are common.
    pub redirect_uri: String,
    /// GraphQL HTTP endpoint.
    pub graphql_url: Url,
    /// GraphQL WebSocket endpoint.
    pub graphql_ws_url: Url,
    /// Role header value.
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

impl ClientSettings {
    /// Load from `GQLAUTH_CLIENT_ID`, `GQLAUTH_TOKEN_URL`,
    /// `GQLAUTH_REDIRECT_URI`, `GQLAUTH_GRAPHQL_URL`, `GQLAUTH_GRAPHQL_WS_URL`
    /// and the optional `GQLAUTH_AUTH_URL` and `GQLAUTH_ROLE`.
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), but when `GQLAUTH_ISSUER_URL` is
    /// set the token and authorization endpoints come from the issuer's
    /// discovery document unless given explicitly.
    pub async fn from_env_discovered() -> ClientResult<Self> {
        Self::from_lookup_discovered(|key| std::env::var(key).ok()).await
    }

    /// Load through `lookup`, which receives full variable names.
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::build(lookup, None)
    }

    /// Load through `lookup`, fetching the discovery document of
    /// `GQLAUTH_ISSUER_URL` when it is set.
    pub async fn from_lookup_discovered<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let issuer = lookup(&format!("{}ISSUER_URL", ENV_PREFIX))
            .filter(|value| !value.trim().is_empty());
        let discovered = match issuer {
            Some(issuer) => {
                debug!(%issuer, "Discovering identity provider endpoints");
                Some(DiscoveryDocument::discover(&issuer, DEFAULT_REQUEST_TIMEOUT).await?)
            }
            None => None,
        };
        Self::build(lookup, discovered)
    }

    fn build<F>(lookup: F, discovered: Option<DiscoveryDocument>) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|value| !value.trim().is_empty())
        };
        let required = |name: &str| {
            get(name).ok_or_else(|| {
                ClientError::config(format!("{}{} is not set", ENV_PREFIX, name))
            })
        };
        let parse = |name: &str, value: String| {
            Url::parse(&value)
                .map_err(|e| ClientError::config(format!("{}{}: {}", ENV_PREFIX, name, e)))
        };

        let client_id = required("CLIENT_ID")?;
        // Explicit endpoints win over discovered ones.
        let token_url = match (get("TOKEN_URL"), &discovered) {
            (Some(value), _) => value,
            (None, Some(doc)) => doc.token_endpoint.clone(),
            (None, None) => required("TOKEN_URL")?,
        };
        let auth_url = get("AUTH_URL")
            .or_else(|| discovered.as_ref().map(|doc| doc.authorization_endpoint.clone()));

        let settings = Self {
            client_id,
            issuer_url: get("ISSUER_URL").map(|v| parse("ISSUER_URL", v)).transpose()?,
            token_url: parse("TOKEN_URL", token_url)?,
            auth_url: auth_url.map(|v| parse("AUTH_URL", v)).transpose()?,
            redirect_uri: required("REDIRECT_URI")?,
            graphql_url: parse("GRAPHQL_URL", required("GRAPHQL_URL")?)?,
            graphql_ws_url: parse("GRAPHQL_WS_URL", required("GRAPHQL_WS_URL")?)?,
            role: get("ROLE").unwrap_or_else(default_role),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check endpoint schemes.
    pub fn validate(&self) -> ClientResult<()> {
        for (name, url) in [("token_url", &self.token_url), ("graphql_url", &self.graphql_url)] {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ClientError::config(format!(
                    "{} must use http or https, got {}",
                    name,
                    url.scheme()
                )));
            }
        }
        if !matches!(self.graphql_ws_url.scheme(), "ws" | "wss") {
            return Err(ClientError::config(format!(
                "graphql_ws_url must use ws or wss, got {}",
                self.graphql_ws_url.scheme()
            )));
        }
        Ok(())
    }

    /// Token endpoint configuration.
    pub fn oauth_config(&self) -> OAuthConfig {
        let config = OAuthConfig::new(self.client_id.clone(), self.token_url.as_str())
            .with_redirect_uri(self.redirect_uri.clone());
        match &self.auth_url {
            Some(auth_url) => config.with_auth_url(auth_url.as_str()),
            None => config,
        }
    }

    /// HTTP link configuration.
    pub fn http_config(&self) -> HttpLinkConfig {
        HttpLinkConfig::new(self.graphql_url.as_str())
    }

    /// Subscription channel configuration.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::new(self.graphql_ws_url.as_str()).with_role(self.role.clone())
    }
}
