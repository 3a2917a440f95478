//! Error types shared by every gqlauth crate.
//!
//! The transport boundary decides once what kind of failure an operation hit
//! and reports it as a [`LinkError`] variant. Callers match on the variant
//! instead of digging through nested `extensions` maps.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error code Hasura reports when the bearer token is invalid or expired.
pub const INVALID_JWT_CODE: &str = "invalid-jwt";

/// GraphQL error location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    /// Line number in the query (1-based).
    pub line: u32,
    /// Column number in the query (1-based).
    pub column: u32,
}

/// A single entry of a GraphQL response's `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    /// Human-readable error message.
    pub message: String,
    /// Location(s) within the query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphqlErrorLocation>,
    /// Path within the response where the error occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<serde_json::Value>,
    /// Extensions metadata (`code`, `path`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl GraphqlError {
    /// Create an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }

    /// Attach an `extensions.code` value.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        let mut extensions = match self.extensions.take() {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        extensions.insert("code".to_string(), serde_json::Value::String(code.into()));
        self.extensions = Some(serde_json::Value::Object(extensions));
        self
    }

    /// The structured error code, if the server sent one.
    pub fn code(&self) -> Option<&str> {
        self.extensions.as_ref()?.get("code")?.as_str()
    }

    /// Whether this error reports an invalid or expired credential.
    pub fn is_invalid_credential(&self) -> bool {
        self.code() == Some(INVALID_JWT_CODE)
    }
}

/// Errors from the identity provider or the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No access token is held.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A refresh was requested but no refresh token is held.
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// The token endpoint answered with a non-success status.
    #[error("Token endpoint returned HTTP {status}: {message}")]
    TokenEndpoint {
        /// HTTP status code.
        status: u16,
        /// `error_description` from the body, or the raw body.
        message: String,
    },

    /// The token endpoint did not answer in time.
    #[error("Token endpoint request timed out")]
    Timeout,

    /// The token endpoint could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The token endpoint answered 2xx with an unusable body.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// A token could not be decoded.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The user or the identity provider rejected the authorization request.
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),
}

impl AuthError {
    /// Create a token endpoint error.
    pub fn token_endpoint(status: u16, message: impl Into<String>) -> Self {
        Self::TokenEndpoint {
            status,
            message: message.into(),
        }
    }

    /// Whether the failure happened before the identity provider answered.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Timeout | Self::Network(_))
    }
}

/// Transport-level failure details (no GraphQL body was obtained).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    /// Error message.
    pub message: String,
    /// HTTP status code (if a response arrived).
    pub status: Option<u16>,
    /// Whether the error was a timeout.
    pub is_timeout: bool,
    /// Whether the error was a connection failure.
    pub is_connect: bool,
}

impl TransportError {
    /// Create a transport error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            is_timeout: false,
            is_connect: false,
        }
    }

    /// Create a transport error for an HTTP status without a GraphQL body.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            message: body.into(),
            status: Some(status),
            is_timeout: false,
            is_connect: false,
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Error observed by the caller of a GraphQL operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    /// The server rejected the bearer credential.
    #[error("Invalid credential: {message}")]
    Auth {
        /// Message of the first invalid-credential error.
        message: String,
        /// The full error list.
        errors: Vec<GraphqlError>,
    },

    /// The server answered with GraphQL errors unrelated to the credential.
    #[error("GraphQL errors: {}", summarize(.errors))]
    Application {
        /// The error list.
        errors: Vec<GraphqlError>,
    },

    /// No GraphQL body was obtained.
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Recovery from an invalid credential failed at the token endpoint.
    #[error("Credential refresh failed: {0}")]
    RefreshFailed(#[source] AuthError),

    /// The response body could not be interpreted.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl LinkError {
    /// Create a transport error from a message.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(TransportError::new(message))
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Classify a non-empty GraphQL error list.
    pub fn from_graphql_errors(errors: Vec<GraphqlError>) -> Self {
        match errors.iter().find(|err| err.is_invalid_credential()) {
            Some(err) => Self::Auth {
                message: err.message.clone(),
                errors,
            },
            None => Self::Application { errors },
        }
    }

    /// Whether this is the recoverable invalid-credential error.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// The GraphQL errors carried by this error, if any.
    pub fn graphql_errors(&self) -> &[GraphqlError] {
        match self {
            Self::Auth { errors, .. } | Self::Application { errors } => errors,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

fn summarize(errors: &[GraphqlError]) -> String {
    errors
        .iter()
        .map(|err| match err.code() {
            Some(code) => format!("{} [{}]", err.message, code),
            None => err.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for GraphQL operations.
pub type LinkResult<T> = Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_extraction() {
        let err: GraphqlError = serde_json::from_value(serde_json::json!({
            "message": "Could not verify JWT: JWTExpired",
            "extensions": {"path": "$", "code": "invalid-jwt"}
        }))
        .unwrap();

        assert_eq!(err.code(), Some("invalid-jwt"));
        assert!(err.is_invalid_credential());
    }

    #[test]
    fn test_missing_extensions() {
        let err = GraphqlError::new("boom");
        assert_eq!(err.code(), None);
        assert!(!err.is_invalid_credential());
    }

    #[test]
    fn test_classification() {
        let auth = LinkError::from_graphql_errors(vec![
            GraphqlError::new("other").with_code("validation-failed"),
            GraphqlError::new("expired").with_code(INVALID_JWT_CODE),
        ]);
        assert!(auth.is_auth());
        assert_eq!(auth.graphql_errors().len(), 2);

        let app = LinkError::from_graphql_errors(vec![
            GraphqlError::new("field not found").with_code("validation-failed"),
        ]);
        assert!(!app.is_auth());
        assert_eq!(
            app.to_string(),
            "GraphQL errors: field not found [validation-failed]"
        );
    }

    #[test]
    fn test_transport_is_not_auth() {
        let err = LinkError::Transport(TransportError::status(401, "unauthorized"));
        assert!(!err.is_auth());
        assert!(err.graphql_errors().is_empty());
        assert_eq!(err.to_string(), "Transport error: HTTP 401: unauthorized");
    }

    #[test]
    fn test_auth_error_network() {
        assert!(AuthError::Timeout.is_network());
        assert!(AuthError::Network("refused".into()).is_network());
        assert!(!AuthError::token_endpoint(400, "invalid_grant").is_network());
    }
}
