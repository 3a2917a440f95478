//! Bearer decoration with refresh-and-retry on invalid credentials.

use async_trait::async_trait;
use gqlauth_core::{
    bearer, GraphqlResponse, GraphqlTransport, LinkError, LinkResult, Operation,
    AUTHORIZATION_HEADER, DEFAULT_ROLE, ROLE_HEADER,
};
use gqlauth_oauth::CredentialStore;
use tracing::{debug, info, warn};

/// How a request through an [`AuthLink`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// First attempt succeeded.
    Success,
    /// First attempt failed with an error that is not a credential rejection.
    OtherError,
    /// Credential was refreshed and the resubmitted request succeeded.
    RetriedSuccess,
    /// Credential was refreshed and the resubmitted request failed.
    RetriedError,
    /// Credential refresh failed; nothing was resubmitted.
    RefreshFailed,
}

impl AuthOutcome {
    /// Whether the request was sent a second time.
    pub fn was_retried(self) -> bool {
        matches!(self, Self::RetriedSuccess | Self::RetriedError)
    }
}

/// Link stage that attaches the current access token to each operation.
///
/// When the server rejects the token as `invalid-jwt`, the link refreshes
/// through the [`CredentialStore`] and resubmits the original operation
/// exactly once. Concurrent rejections share one refresh.
#[derive(Debug, Clone)]
pub struct AuthLink<T> {
    inner: T,
    store: CredentialStore,
    role: Option<String>,
}

impl<T: GraphqlTransport> AuthLink<T> {
    /// Wrap `inner`, sending the default `admin` role header.
    pub fn new(inner: T, store: CredentialStore) -> Self {
        Self {
            inner,
            store,
            role: Some(DEFAULT_ROLE.to_string()),
        }
    }

    /// Send `role` as the role header.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Do not send a role header.
    #[must_use]
    pub fn without_role(mut self) -> Self {
        self.role = None;
        self
    }

    /// The credential store used by this link.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Set the authorization and role headers on `operation`.
    ///
    /// A missing token is sent as an empty bearer value so that the server
    /// answers with a credential error the link can act on.
    pub fn decorate(&self, operation: &mut Operation, token: Option<&str>) {
        operation
            .context
            .set_header(AUTHORIZATION_HEADER, bearer(token.unwrap_or_default()));
        match &self.role {
            Some(role) => operation.context.set_header(ROLE_HEADER, role.clone()),
            None => {
                operation.context.remove_header(ROLE_HEADER);
            }
        }
    }

    /// Execute `operation` and report how it ended.
    pub async fn execute_with_outcome(
        &self,
        mut operation: Operation,
    ) -> (LinkResult<GraphqlResponse>, AuthOutcome) {
        let token = self.store.current_access_token();
        let mut first = operation.clone();
        self.decorate(&mut first, token.as_deref());

        match self.inner.execute(first).await {
            Ok(response) => (Ok(response), AuthOutcome::Success),
            Err(err @ LinkError::Auth { .. }) => {
                debug!(error = %err, "Credential rejected, refreshing");
                let credential = match self.store.refresh_after_failure(token.as_deref()).await {
                    Ok(credential) => credential,
                    Err(refresh_err) => {
                        warn!(error = %refresh_err, "Credential refresh failed");
                        return (
                            Err(LinkError::RefreshFailed(refresh_err)),
                            AuthOutcome::RefreshFailed,
                        );
                    }
                };

                self.decorate(&mut operation, credential.access_token.as_deref());
                match self.inner.execute(operation).await {
                    Ok(response) => (Ok(response), AuthOutcome::RetriedSuccess),
                    Err(err) => (Err(err), AuthOutcome::RetriedError),
                }
            }
            Err(err) => (Err(err), AuthOutcome::OtherError),
        }
    }
}

#[async_trait]
impl<T: GraphqlTransport> GraphqlTransport for AuthLink<T> {
    async fn execute(&self, operation: Operation) -> LinkResult<GraphqlResponse> {
        let name = operation.operation_name.clone();
        let (result, outcome) = self.execute_with_outcome(operation).await;
        match outcome {
            AuthOutcome::Success | AuthOutcome::OtherError => {
                debug!(operation = name.as_deref(), ?outcome, "Request finished");
            }
            _ => {
                info!(operation = name.as_deref(), ?outcome, "Request finished after refresh");
            }
        }
        result
    }
}
