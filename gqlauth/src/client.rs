//! Client wiring the credential store, links and subscription channel.

use std::sync::Arc;

use gqlauth_core::{GraphqlResponse, GraphqlTransport, Operation};
use gqlauth_link::{AuthLink, HttpLink};
use gqlauth_oauth::{CredentialStore, PkceContext, TokenClient};
use gqlauth_streaming::{
    ChannelConfig, ChannelEvent, Connector, ReconnectPolicy, Subscription, SubscriptionChannel,
};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::flow::LoginFlow;
use crate::settings::ClientSettings;

/// Builder for [`GqlClient`].
pub struct GqlClientBuilder {
    settings: ClientSettings,
    connector: Option<Arc<dyn Connector>>,
    backoff: Option<ReconnectPolicy>,
    channel: Option<Box<dyn FnOnce(ChannelConfig) -> ChannelConfig + Send>>,
}

impl std::fmt::Debug for GqlClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GqlClientBuilder")
            .field("settings", &self.settings)
            .field("custom_connector", &self.connector.is_some())
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl GqlClientBuilder {
    /// Start from settings.
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            connector: None,
            backoff: None,
            channel: None,
        }
    }

    /// Open subscription sockets through `connector`.
    #[must_use]
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Set the reconnect backoff.
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.backoff = Some(policy);
        self
    }

    /// Adjust the channel configuration derived from the settings.
    #[must_use]
    pub fn channel_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(ChannelConfig) -> ChannelConfig + Send + 'static,
    {
        self.channel = Some(Box::new(f));
        self
    }

    /// Build the client. Must run inside a tokio runtime, which hosts the
    /// channel driver.
    pub fn build(self) -> ClientResult<GqlClient> {
        self.settings.validate()?;

        let token_client = Arc::new(TokenClient::new(self.settings.oauth_config())?);
        let store = CredentialStore::new(token_client.clone());

        let http = HttpLink::new(self.settings.http_config())?;
        let link = Arc::new(AuthLink::new(http, store.clone()).with_role(self.settings.role.clone()));

        let mut channel_config = self.settings.channel_config();
        if let Some(backoff) = self.backoff {
            channel_config = channel_config.with_backoff(backoff);
        }
        if let Some(adjust) = self.channel {
            channel_config = adjust(channel_config);
        }
        let connector = match self.connector {
            Some(connector) => connector,
            None => default_connector()?,
        };
        let channel =
            SubscriptionChannel::from_parts(channel_config, Arc::new(store.clone()), connector);

        let login = LoginFlow::new(token_client.clone(), store.clone(), link.clone());

        debug!(
            graphql_url = %self.settings.graphql_url,
            graphql_ws_url = %self.settings.graphql_ws_url,
            "Client built"
        );

        Ok(GqlClient {
            settings: self.settings,
            token_client,
            store,
            link,
            channel,
            login,
        })
    }
}

#[cfg(feature = "websocket")]
fn default_connector() -> ClientResult<Arc<dyn Connector>> {
    Ok(Arc::new(gqlauth_streaming::WsConnector::new()))
}

#[cfg(not(feature = "websocket"))]
fn default_connector() -> ClientResult<Arc<dyn Connector>> {
    Err(ClientError::config(
        "no connector configured and the websocket feature is disabled",
    ))
}

/// Authenticated GraphQL client.
///
/// Queries and mutations go through the refreshing [`AuthLink`];
/// subscriptions share one [`SubscriptionChannel`]. Both read tokens from the
/// same [`CredentialStore`].
pub struct GqlClient {
    settings: ClientSettings,
    token_client: Arc<TokenClient>,
    store: CredentialStore,
    link: Arc<AuthLink<HttpLink>>,
    channel: SubscriptionChannel,
    login: LoginFlow,
}

impl std::fmt::Debug for GqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GqlClient")
            .field("graphql_url", &self.settings.graphql_url.as_str())
            .field("store", &self.store)
            .field("channel", &self.channel)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

impl GqlClient {
    /// Start building a client.
    pub fn builder(settings: ClientSettings) -> GqlClientBuilder {
        GqlClientBuilder::new(settings)
    }

    /// Build a client with default options.
    pub fn new(settings: ClientSettings) -> ClientResult<Self> {
        GqlClientBuilder::new(settings).build()
    }

    /// Settings the client was built from.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// The shared credential store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Token endpoint client.
    pub fn token_client(&self) -> &TokenClient {
        &self.token_client
    }

    /// The login driver.
    pub fn login(&self) -> &LoginFlow {
        &self.login
    }

    /// Authorization page URL for `pkce`.
    pub fn authorization_url(&self, pkce: &PkceContext) -> ClientResult<Url> {
        Ok(pkce.authorization_url(self.token_client.config())?)
    }

    /// Execute a query or mutation.
    pub async fn execute(&self, operation: Operation) -> ClientResult<GraphqlResponse> {
        Ok(self.link.execute(operation).await?)
    }

    /// Execute an operation and deserialize its `data` field.
    pub async fn query<T: DeserializeOwned>(&self, operation: Operation) -> ClientResult<T> {
        let response = self.execute(operation).await?;
        response
            .data_as()
            .map_err(|err| ClientError::InvalidResponse(err.to_string()))
    }

    /// Start a subscription.
    pub fn subscribe(&self, operation: Operation) -> ClientResult<Subscription> {
        Ok(self.channel.subscribe(operation)?)
    }

    /// The subscription channel.
    pub fn channel(&self) -> &SubscriptionChannel {
        &self.channel
    }

    /// Subscribe to channel lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.channel.events()
    }

    /// Forget tokens and return the session to logged out.
    ///
    /// Open subscriptions keep their connection until [`GqlClient::close`].
    pub fn logout(&self) {
        self.login.logout();
    }

    /// Close the subscription channel.
    pub async fn close(&self) {
        self.channel.close().await;
    }
}
