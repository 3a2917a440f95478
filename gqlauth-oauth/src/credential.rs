//! Process-wide credential holder with a single-flight refresh.
//!
//! The store is created by the application root and handed to every stage
//! that needs a token. Only [`CredentialStore::set`] and the refresh path
//! write to it. At most one refresh-token exchange is in flight at a time:
//! concurrent callers share the pending exchange and observe its result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use gqlauth_core::{AccessTokenSource, AuthError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::client::TokenRefresher;
use crate::token::TokenResponse;

/// Tokens are treated as expired this long before `expires_at`.
const EXPIRY_SKEW_SECS: i64 = 10;

/// The tokens currently held for the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token sent with every operation.
    pub access_token: Option<String>,
    /// Token exchanged for a new access token.
    pub refresh_token: Option<String>,
    /// When the access token expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Create a credential without expiry information.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            expires_at: None,
        }
    }

    /// Set the expiry.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Build a credential from a token response issued at `now`.
    ///
    /// A response without a refresh token keeps `previous_refresh_token`.
    pub fn from_response(
        response: &TokenResponse,
        previous_refresh_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let access_token = response
            .access_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AuthError::InvalidResponse("missing access_token".to_string()))?;

        let refresh_token = response
            .refresh_token
            .clone()
            .filter(|token| !token.is_empty())
            .or_else(|| previous_refresh_token.map(str::to_string));

        let expires_at = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| now + Duration::seconds(secs));

        Ok(Self {
            access_token: Some(access_token),
            refresh_token,
            expires_at,
        })
    }

    /// Whether the access token should be considered expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - Duration::seconds(EXPIRY_SKEW_SECS) <= now)
    }

    /// Whether a refresh is possible.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<Credential, AuthError>>>;

struct StoreInner {
    credential: RwLock<Credential>,
    pending: Mutex<Option<SharedRefresh>>,
    refresher: Arc<dyn TokenRefresher>,
    exchanges: AtomicU64,
}

impl StoreInner {
    async fn exchange(&self) -> Result<Credential, AuthError> {
        let refresh_token = self
            .credential
            .read()
            .refresh_token
            .clone()
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingRefreshToken)?;

        self.exchanges.fetch_add(1, Ordering::SeqCst);
        info!("Refreshing credential");

        let response = match self.refresher.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Credential refresh failed");
                return Err(err);
            }
        };

        let credential = Credential::from_response(&response, Some(&refresh_token), Utc::now())?;
        *self.credential.write() = credential.clone();
        debug!(expires_at = ?credential.expires_at, "Credential refreshed");
        Ok(credential)
    }
}

async fn run_refresh(inner: Arc<StoreInner>) -> Result<Credential, AuthError> {
    let result = inner.exchange().await;
    inner.pending.lock().take();
    result
}

/// Shared holder of the current [`Credential`].
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let credential = self.inner.credential.read();
        f.debug_struct("CredentialStore")
            .field("has_access_token", &credential.access_token.is_some())
            .field("has_refresh_token", &credential.refresh_token.is_some())
            .field("expires_at", &credential.expires_at)
            .finish()
    }
}

impl CredentialStore {
    /// Create an empty store that refreshes through `refresher`.
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                credential: RwLock::new(Credential::default()),
                pending: Mutex::new(None),
                refresher,
                exchanges: AtomicU64::new(0),
            }),
        }
    }

    /// Snapshot of the current credential.
    pub fn get(&self) -> Credential {
        self.inner.credential.read().clone()
    }

    /// Current access token, if any.
    pub fn current_access_token(&self) -> Option<String> {
        self.inner.credential.read().access_token.clone()
    }

    /// Replace the credential.
    pub fn set(&self, credential: Credential) {
        *self.inner.credential.write() = credential;
    }

    /// Replace the credential with the tokens of a code exchange response.
    pub fn set_from_response(&self, response: &TokenResponse) -> Result<Credential, AuthError> {
        let credential = Credential::from_response(response, None, Utc::now())?;
        self.set(credential.clone());
        Ok(credential)
    }

    /// Forget all tokens.
    pub fn clear(&self) {
        self.set(Credential::default());
    }

    /// Number of refresh-token exchanges performed so far.
    pub fn exchange_count(&self) -> u64 {
        self.inner.exchanges.load(Ordering::SeqCst)
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.pending.lock().is_some()
    }

    /// Refresh the credential, joining an in-flight refresh if there is one.
    pub async fn refresh(&self) -> Result<Credential, AuthError> {
        self.join_or_start(|_| false).await
    }

    /// Refresh after a request sent with `failed_token` was rejected.
    ///
    /// When no refresh is running and the held token already differs from
    /// `failed_token`, another caller rotated it in the meantime and the
    /// current credential is returned without a new exchange.
    pub async fn refresh_after_failure(
        &self,
        failed_token: Option<&str>,
    ) -> Result<Credential, AuthError> {
        self.join_or_start(|current| {
            current
                .access_token
                .as_deref()
                .is_some_and(|token| Some(token) != failed_token)
        })
        .await
    }

    async fn join_or_start<F>(&self, already_rotated: F) -> Result<Credential, AuthError>
    where
        F: Fn(&Credential) -> bool,
    {
        let pending = {
            let mut slot = self.inner.pending.lock();
            match slot.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight credential refresh");
                    existing.clone()
                }
                None => {
                    // The exchange writes the credential before it clears the
                    // slot, so an empty slot means the snapshot is settled.
                    let current = self.get();
                    if already_rotated(&current) {
                        debug!("Credential rotated since the failed attempt");
                        return Ok(current);
                    }
                    let shared = run_refresh(self.inner.clone()).boxed().shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };
        pending.await
    }
}

#[async_trait]
impl AccessTokenSource for CredentialStore {
    async fn access_token(&self) -> Result<String, AuthError> {
        let current = self.get();
        let credential = if current.can_refresh() && current.is_expired_at(Utc::now()) {
            debug!("Access token expired, refreshing before use");
            self.refresh().await?
        } else {
            current
        };

        credential
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration as StdDuration;

    struct CountingRefresher {
        calls: AtomicU32,
        delay: StdDuration,
        fail: bool,
    }

    impl CountingRefresher {
        fn new(delay: StdDuration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay: StdDuration::ZERO,
                fail: true,
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(AuthError::Network("connection refused".into()));
            }
            Ok(TokenResponse {
                access_token: Some(format!("A{}", n + 1)),
                refresh_token: Some(format!("{}-rotated", refresh_token)),
                expires_in: Some(300),
                ..Default::default()
            })
        }
    }

    fn store_with(refresher: Arc<CountingRefresher>) -> CredentialStore {
        let store = CredentialStore::new(refresher);
        store.set(Credential::new("A1", "R1"));
        store
    }

    #[test]
    fn test_from_response_keeps_previous_refresh_token() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: Some("A2".into()),
            expires_in: Some(60),
            ..Default::default()
        };
        let credential = Credential::from_response(&response, Some("R1"), now).unwrap();

        assert_eq!(credential.access_token.as_deref(), Some("A2"));
        assert_eq!(credential.refresh_token.as_deref(), Some("R1"));
        assert_eq!(credential.expires_at, Some(now + Duration::seconds(60)));
    }

    #[test]
    fn test_from_response_requires_access_token() {
        let response = TokenResponse {
            access_token: Some(String::new()),
            refresh_token: Some("R2".into()),
            ..Default::default()
        };
        assert!(matches!(
            Credential::from_response(&response, None, Utc::now()),
            Err(AuthError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_expiry_skew() {
        let now = Utc::now();
        let credential = Credential::new("A1", "R1").with_expires_at(now + Duration::seconds(5));
        assert!(credential.is_expired_at(now));

        let credential = Credential::new("A1", "R1").with_expires_at(now + Duration::seconds(60));
        assert!(!credential.is_expired_at(now));
        assert!(!Credential::new("A1", "R1").is_expired_at(now));
    }

    #[tokio::test]
    async fn test_refresh_updates_store() {
        let refresher = CountingRefresher::new(StdDuration::ZERO);
        let store = store_with(refresher.clone());

        let credential = store.refresh().await.unwrap();
        assert_eq!(credential.access_token.as_deref(), Some("A2"));
        assert_eq!(store.get().refresh_token.as_deref(), Some("R1-rotated"));
        assert_eq!(store.exchange_count(), 1);
        assert!(!store.is_refreshing());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_exchange() {
        let refresher = CountingRefresher::new(StdDuration::from_millis(50));
        let store = store_with(refresher.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.refresh_after_failure(Some("A1")).await })
            })
            .collect();

        for handle in handles {
            let credential = handle.await.unwrap().unwrap();
            assert_eq!(credential.access_token.as_deref(), Some("A2"));
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.exchange_count(), 1);
    }

    #[tokio::test]
    async fn test_late_failure_reuses_rotated_token() {
        let refresher = CountingRefresher::new(StdDuration::ZERO);
        let store = store_with(refresher.clone());

        store.refresh_after_failure(Some("A1")).await.unwrap();
        let again = store.refresh_after_failure(Some("A1")).await.unwrap();

        assert_eq!(again.access_token.as_deref(), Some("A2"));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_skips_network() {
        let refresher = CountingRefresher::new(StdDuration::ZERO);
        let store = CredentialStore::new(refresher.clone());
        store.set(Credential {
            access_token: Some("A1".into()),
            refresh_token: None,
            expires_at: None,
        });

        assert_eq!(store.refresh().await, Err(AuthError::MissingRefreshToken));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.exchange_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_credential() {
        let refresher = CountingRefresher::failing();
        let store = store_with(refresher.clone());

        assert!(store.refresh().await.unwrap_err().is_network());
        assert_eq!(store.get(), Credential::new("A1", "R1"));
        assert!(!store.is_refreshing());
    }

    #[tokio::test]
    async fn test_access_token_refreshes_when_expired() {
        let refresher = CountingRefresher::new(StdDuration::ZERO);
        let store = CredentialStore::new(refresher.clone());
        store.set(
            Credential::new("A1", "R1").with_expires_at(Utc::now() - Duration::seconds(1)),
        );

        assert_eq!(store.access_token().await.unwrap(), "A2");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        // Fresh now; no further exchange.
        assert_eq!(store.access_token().await.unwrap(), "A2");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_access_token_not_authenticated() {
        let store = CredentialStore::new(CountingRefresher::new(StdDuration::ZERO));
        assert_eq!(store.access_token().await, Err(AuthError::NotAuthenticated));
    }

    #[test]
    fn test_debug_hides_tokens() {
        let store = store_with(CountingRefresher::new(StdDuration::ZERO));
        let debug = format!("{:?}", store);
        assert!(!debug.contains("A1"));
        assert!(debug.contains("has_access_token: true"));
    }
}
