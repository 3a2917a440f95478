//! Drives a [`SessionMachine`] through one login.

use std::sync::Arc;

use gqlauth_core::{AuthError, GraphqlTransport};
use gqlauth_oauth::{CredentialStore, IdentityClaims, TokenClient};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{authentication_message, ClientError, ClientResult};
use crate::person::{parse_identity, IdentityVariables, Person};
use crate::session::{SessionEvent, SessionMachine, SessionState};

/// Login driver: code exchange, credential storage and person upsert.
///
/// The machine lock is never held across an `.await`.
pub struct LoginFlow {
    token_client: Arc<TokenClient>,
    store: CredentialStore,
    link: Arc<dyn GraphqlTransport>,
    machine: Mutex<SessionMachine>,
}

impl std::fmt::Debug for LoginFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginFlow")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl LoginFlow {
    /// Create a flow writing into `store` and upserting through `link`.
    pub fn new(
        token_client: Arc<TokenClient>,
        store: CredentialStore,
        link: Arc<dyn GraphqlTransport>,
    ) -> Self {
        Self {
            token_client,
            store,
            link,
            machine: Mutex::new(SessionMachine::new()),
        }
    }

    /// Snapshot of the session state.
    pub fn state(&self) -> SessionState {
        self.machine.lock().state().clone()
    }

    /// Record that the user opened the authorization page.
    pub fn login_requested(&self) -> ClientResult<SessionState> {
        self.apply(SessionEvent::LoginRequested)
    }

    /// Record an authorization error response.
    ///
    /// Returns the user-visible [`ClientError::Authentication`].
    pub fn denied(&self, description: Option<&str>) -> ClientError {
        let event = SessionEvent::AuthorizationDenied {
            description: description.map(str::to_string),
        };
        if let Err(err) = self.apply(event) {
            return err;
        }
        warn!("Authorization denied");
        ClientError::authentication(description)
    }

    /// Finish a login with the authorization `code`.
    ///
    /// A flow still logged out is moved to authenticating first. Any failure
    /// leaves the session in [`SessionState::Error`] and is returned as
    /// [`ClientError::Authentication`].
    pub async fn complete(&self, code: &str, code_verifier: Option<&str>) -> ClientResult<Person> {
        {
            let mut machine = self.machine.lock();
            if *machine.state() == SessionState::LoggedOut {
                machine.apply(SessionEvent::LoginRequested)?;
            }
            machine.apply(SessionEvent::AuthorizationGranted {
                code: code.to_string(),
                code_verifier: code_verifier.map(str::to_string),
            })?;
        }

        let tokens = match self.token_client.exchange_code(code, code_verifier).await {
            Ok(tokens) => tokens,
            Err(err) => return Err(self.fail(&err)),
        };
        let credential = match self.store.set_from_response(&tokens) {
            Ok(credential) => credential,
            Err(err) => return Err(self.fail(&err)),
        };
        self.apply(SessionEvent::TokensIssued)?;

        let claims = match credential
            .access_token
            .as_deref()
            .ok_or(AuthError::NotAuthenticated)
            .and_then(IdentityClaims::decode_unverified)
        {
            Ok(claims) => claims,
            Err(err) => return Err(self.fail(&err)),
        };

        let person = match self.upsert(&claims).await {
            Ok(person) => person,
            Err(err) => {
                warn!(error = %err, "Person upsert failed");
                return Err(self.fail_with(None));
            }
        };

        self.apply(SessionEvent::PersonUpserted(person.clone()))?;
        info!("Logged in");
        Ok(person)
    }

    /// Forget the credential and return to logged out.
    pub fn logout(&self) {
        self.store.clear();
        // Logout applies to every state.
        let _ = self.apply(SessionEvent::Logout);
        info!("Logged out");
    }

    /// Leave the error state.
    pub fn reset(&self) -> ClientResult<SessionState> {
        self.apply(SessionEvent::Reset)
    }

    async fn upsert(&self, claims: &IdentityClaims) -> ClientResult<Person> {
        let operation = IdentityVariables::from_claims(claims).to_operation()?;
        let response = self.link.execute(operation).await?;
        Ok(parse_identity(&response)?.person)
    }

    fn apply(&self, event: SessionEvent) -> ClientResult<SessionState> {
        let mut machine = self.machine.lock();
        Ok(machine.apply(event)?.clone())
    }

    fn fail(&self, err: &AuthError) -> ClientError {
        warn!(error = %err, "Login step failed");
        let description = match err {
            AuthError::TokenEndpoint { message, .. } => Some(message.as_str()),
            AuthError::AuthorizationDenied(description) => Some(description.as_str()),
            _ => None,
        };
        self.fail_with(description)
    }

    fn fail_with(&self, description: Option<&str>) -> ClientError {
        let message = authentication_message(description);
        let _ = self.apply(SessionEvent::Failed(message.clone()));
        ClientError::Authentication(message)
    }
}
