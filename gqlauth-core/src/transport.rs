//! Seams between the pipeline stages.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AuthError, LinkResult};
use crate::operation::{GraphqlResponse, Operation};

/// Header carrying the bearer credential.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Header selecting the Hasura role.
pub const ROLE_HEADER: &str = "x-hasura-role";

/// Role sent when none is configured.
pub const DEFAULT_ROLE: &str = "admin";

/// Format a bearer header value.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// A stage that executes GraphQL operations.
#[async_trait]
pub trait GraphqlTransport: Send + Sync {
    /// Execute an operation and return its classified result.
    async fn execute(&self, operation: Operation) -> LinkResult<GraphqlResponse>;
}

#[async_trait]
impl<T: GraphqlTransport + ?Sized> GraphqlTransport for Arc<T> {
    async fn execute(&self, operation: Operation) -> LinkResult<GraphqlResponse> {
        (**self).execute(operation).await
    }
}

#[async_trait]
impl<T: GraphqlTransport + ?Sized> GraphqlTransport for Box<T> {
    async fn execute(&self, operation: Operation) -> LinkResult<GraphqlResponse> {
        (**self).execute(operation).await
    }
}

/// Capability to obtain a usable access token, refreshing if needed.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Return an access token for a new request or connection.
    async fn access_token(&self) -> Result<String, AuthError>;
}

#[async_trait]
impl<T: AccessTokenSource + ?Sized> AccessTokenSource for Arc<T> {
    async fn access_token(&self) -> Result<String, AuthError> {
        (**self).access_token().await
    }
}

/// Token source returning a fixed token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, AuthError> {
        if self.0.is_empty() {
            return Err(AuthError::NotAuthenticated);
        }
        Ok(self.0.clone())
    }
}
