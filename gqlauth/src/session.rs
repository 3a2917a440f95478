//! Login session state machine.
//!
//! ```text
//! LoggedOut -> Authenticating -> Exchanging -> Upserting -> LoggedIn
//!                    |               |             |
//!                    +---------------+-------------+--> Error
//! ```
//!
//! `Error` stays until `Logout` or `Reset`. Events that do not apply to the
//! current state are rejected and leave it unchanged.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{authentication_message, SessionError};
use crate::person::Person;

/// Where the login currently is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No credential.
    #[default]
    LoggedOut,
    /// Waiting for the authorization response.
    Authenticating,
    /// Trading the authorization code for tokens.
    Exchanging,
    /// Creating or updating the person record.
    Upserting,
    /// Logged in as `person`.
    LoggedIn {
        /// The upserted person.
        person: Person,
    },
    /// Login failed with a user-visible message.
    Error {
        /// Message for the user.
        message: String,
    },
}

impl SessionState {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoggedOut => "logged_out",
            Self::Authenticating => "authenticating",
            Self::Exchanging => "exchanging",
            Self::Upserting => "upserting",
            Self::LoggedIn { .. } => "logged_in",
            Self::Error { .. } => "error",
        }
    }

    /// Whether a person is logged in.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        matches!(self, Self::LoggedIn { .. })
    }

    /// Whether a login is between request and completion.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::Authenticating | Self::Exchanging | Self::Upserting
        )
    }

    /// The logged-in person, if any.
    pub fn person(&self) -> Option<&Person> {
        match self {
            Self::LoggedIn { person } => Some(person),
            _ => None,
        }
    }

    /// The failure message, if any.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            _ => None,
        }
    }
}

/// Input to the session machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The user started a login.
    LoginRequested,
    /// The identity provider returned an authorization code.
    AuthorizationGranted {
        /// Authorization code.
        code: String,
        /// PKCE verifier matching the authorization request.
        code_verifier: Option<String>,
    },
    /// The identity provider returned an error.
    AuthorizationDenied {
        /// `error_description` of the authorization response.
        description: Option<String>,
    },
    /// The code exchange stored a credential.
    TokensIssued,
    /// The person upsert succeeded.
    PersonUpserted(Person),
    /// A step failed.
    Failed(String),
    /// The user logged out.
    Logout,
    /// Leave the error state.
    Reset,
}

impl SessionEvent {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoginRequested => "login_requested",
            Self::AuthorizationGranted { .. } => "authorization_granted",
            Self::AuthorizationDenied { .. } => "authorization_denied",
            Self::TokensIssued => "tokens_issued",
            Self::PersonUpserted(_) => "person_upserted",
            Self::Failed(_) => "failed",
            Self::Logout => "logout",
            Self::Reset => "reset",
        }
    }
}

/// Holds the [`SessionState`] and applies [`SessionEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct SessionMachine {
    state: SessionState,
}

impl SessionMachine {
    /// Start logged out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Apply `event`, returning the new state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] when `event` does not apply
    /// to the current state. The state is left unchanged.
    pub fn apply(&mut self, event: SessionEvent) -> Result<&SessionState, SessionError> {
        let from = self.state.name();
        let event_name = event.name();

        let next = match (&self.state, event) {
            (SessionState::LoggedOut, SessionEvent::LoginRequested) => {
                SessionState::Authenticating
            }
            (SessionState::Authenticating, SessionEvent::AuthorizationGranted { .. }) => {
                SessionState::Exchanging
            }
            (SessionState::Authenticating, SessionEvent::AuthorizationDenied { description }) => {
                SessionState::Error {
                    message: authentication_message(description.as_deref()),
                }
            }
            (SessionState::Exchanging, SessionEvent::TokensIssued) => SessionState::Upserting,
            (SessionState::Upserting, SessionEvent::PersonUpserted(person)) => {
                SessionState::LoggedIn { person }
            }
            (state, SessionEvent::Failed(message)) if state.is_in_progress() => {
                SessionState::Error { message }
            }
            (_, SessionEvent::Logout) => SessionState::LoggedOut,
            (SessionState::Error { .. }, SessionEvent::Reset) => SessionState::LoggedOut,
            _ => {
                warn!(state = from, event = event_name, "Rejected session event");
                return Err(SessionError::InvalidTransition {
                    state: from,
                    event: event_name,
                });
            }
        };

        debug!(from, to = next.name(), event = event_name, "Session transition");
        self.state = next;
        Ok(&self.state)
    }
}
