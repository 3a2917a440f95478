//! Client errors.

use gqlauth_core::{AuthError, LinkError};
use gqlauth_streaming::ChannelError;
use thiserror::Error;

/// Prefix of every user-visible login failure.
pub const AUTHENTICATION_ERROR: &str = "Authentication error";

/// Fallback when the identity provider gives no description.
pub const SOMETHING_WENT_WRONG: &str = "something went wrong";

/// Rejected login session transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The event is not valid in the current state.
    #[error("Cannot apply {event} while {state}")]
    InvalidTransition {
        /// Name of the current state.
        state: &'static str,
        /// Name of the rejected event.
        event: &'static str,
    },
}

/// Errors returned by the client facade.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Settings are missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Login failed; the message is meant for the user.
    #[error("{0}")]
    Authentication(String),

    /// Token endpoint or credential failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// GraphQL request failure.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Subscription channel failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Login session misuse.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The server answered with an unexpected shape.
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// User-visible login failure built from an optional description.
    pub fn authentication(description: Option<&str>) -> Self {
        Self::Authentication(authentication_message(description))
    }

    /// Whether the error is a login failure shown to the user.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

/// `"Authentication error: <description>"`, falling back to a generic text.
pub fn authentication_message(description: Option<&str>) -> String {
    let description = description
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(SOMETHING_WENT_WRONG);
    format!("{}: {}", AUTHENTICATION_ERROR, description)
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("Invalid user credentials"), "Authentication error: Invalid user credentials")]
    #[case(Some(""), "Authentication error: something went wrong")]
    #[case(Some("   "), "Authentication error: something went wrong")]
    #[case(None, "Authentication error: something went wrong")]
    fn test_authentication_message(#[case] description: Option<&str>, #[case] expected: &str) {
        assert_eq!(authentication_message(description), expected);
        assert_eq!(ClientError::authentication(description).to_string(), expected);
    }

    #[test]
    fn test_conversions() {
        let err: ClientError = AuthError::NotAuthenticated.into();
        assert!(matches!(err, ClientError::Auth(_)));

        let err: ClientError = ChannelError::Closed.into();
        assert_eq!(err.to_string(), "Channel closed");
        assert!(!err.is_authentication());
    }
}
