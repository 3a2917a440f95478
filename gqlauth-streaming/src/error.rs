//! Subscription channel errors.

use gqlauth_core::{AuthError, GraphqlError};
use thiserror::Error;

/// Errors surfaced by the subscription channel.
///
/// Clone so one error can be broadcast to every observer and subscription.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    /// The access token could not be obtained for a connection attempt.
    #[error("Token unavailable: {0}")]
    Token(#[source] AuthError),

    /// The socket could not be opened.
    #[error("Connection error: {0}")]
    Connect(String),

    /// No `connection_ack` arrived within the connection timeout.
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// The server closed the socket before acknowledging the connection.
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// The socket failed after the handshake.
    #[error("Socket error: {0}")]
    Socket(String),

    /// The server closed an established session.
    #[error("Connection lost")]
    ConnectionLost,

    /// A frame could not be parsed or was unexpected.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server answered a subscription with an `error` frame.
    #[error("Subscription failed: {}", first_message(.errors))]
    Subscription {
        /// Errors sent by the server.
        errors: Vec<GraphqlError>,
    },

    /// Every attempt of the reconnection budget failed.
    #[error("Gave up after {attempts} connection attempts")]
    ReconnectLimitExceeded {
        /// Number of attempts made.
        attempts: u32,
    },

    /// The channel is closed.
    #[error("Channel closed")]
    Closed,
}

impl ChannelError {
    /// Whether this error ended the channel for good.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReconnectLimitExceeded { .. } | Self::Closed)
    }

    /// Whether this error happened while opening a session.
    #[must_use]
    pub fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::Token(_) | Self::Connect(_) | Self::HandshakeTimeout | Self::Rejected(_)
        )
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

fn first_message(errors: &[GraphqlError]) -> &str {
    errors.first().map_or("unknown error", |err| err.message.as_str())
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ChannelError::Subscription {
            errors: vec![GraphqlError::new("subscription not allowed")],
        };
        assert_eq!(err.to_string(), "Subscription failed: subscription not allowed");
        assert_eq!(
            ChannelError::ReconnectLimitExceeded { attempts: 5 }.to_string(),
            "Gave up after 5 connection attempts"
        );
    }

    #[test]
    fn test_predicates() {
        assert!(ChannelError::Closed.is_terminal());
        assert!(!ChannelError::ConnectionLost.is_terminal());
        assert!(ChannelError::Token(AuthError::NotAuthenticated).is_connect_failure());
        assert!(!ChannelError::Socket("reset".into()).is_connect_failure());
    }
}
