//! GraphQL over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use gqlauth_core::{
    GraphqlResponse, GraphqlTransport, LinkError, LinkResult, Operation, TransportError,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tracing::debug;

/// Configuration for an [`HttpLink`].
#[derive(Debug, Clone)]
pub struct HttpLinkConfig {
    /// GraphQL endpoint URL.
    pub endpoint: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Headers sent with every request, before the operation's own headers.
    pub headers: Vec<(String, String)>,
}

impl HttpLinkConfig {
    /// Create a config for an endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(30),
            headers: Vec::new(),
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a default header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

fn transport_error(err: reqwest::Error) -> LinkError {
    LinkError::Transport(TransportError {
        message: err.to_string(),
        status: err.status().map(|s| s.as_u16()),
        is_timeout: err.is_timeout(),
        is_connect: err.is_connect(),
    })
}

/// Terminal stage that posts operations to a GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct HttpLink {
    http: Client,
    config: HttpLinkConfig,
}

impl HttpLink {
    /// Create a link with its own HTTP client.
    pub fn new(config: HttpLinkConfig) -> LinkResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(transport_error)?;
        Ok(Self { http, config })
    }

    /// Create with a custom reqwest client.
    pub fn with_client(http: Client, config: HttpLinkConfig) -> Self {
        Self { http, config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &HttpLinkConfig {
        &self.config
    }
}

#[async_trait]
impl GraphqlTransport for HttpLink {
    async fn execute(&self, operation: Operation) -> LinkResult<GraphqlResponse> {
        debug!(
            endpoint = %self.config.endpoint,
            operation = operation.operation_name.as_deref().unwrap_or("<anonymous>"),
            kind = ?operation.kind,
            "Sending GraphQL request"
        );

        let mut request = self
            .http
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        for (key, value) in &self.config.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        for (key, value) in operation.context.headers() {
            request = request.header(key, value);
        }

        let response = request
            .json(&operation.to_request())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        // A GraphQL body decides the outcome even on non-2xx statuses.
        match serde_json::from_slice::<GraphqlResponse>(&body) {
            Ok(parsed) if parsed.data.is_some() || !parsed.errors.is_empty() => {
                parsed.into_result()
            }
            _ if !status.is_success() => Err(LinkError::Transport(TransportError::status(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ))),
            Ok(parsed) => Ok(parsed),
            Err(err) => Err(LinkError::protocol(format!("invalid GraphQL body: {}", err))),
        }
    }
}
