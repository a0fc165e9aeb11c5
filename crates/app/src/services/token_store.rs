//! Token store: the single owner of the OAuth credential.
//!
//! Holds the current [`TokenRecord`], refreshes it proactively from a
//! periodic monitor and reactively when a remote call is rejected, persists
//! every committed change, and escalates to re-authentication when a refresh
//! is impossible. At most one refresh exchange is in flight at a time;
//! concurrent callers share its outcome.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::TimeDelta;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use capbridge_domain::error::{ApiError, AuthError, BridgeError};
use capbridge_domain::time;
use capbridge_domain::token::{DEFAULT_REFRESH_TOKEN_LIFETIME, TokenGrant, TokenRecord};

use crate::ports::{
    AuthorizationHandler, PlatformApi, ReauthReason, Reauthenticator, TokenRepository,
};

const MIN_MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// Token lifetime and monitor settings.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    /// Refresh-token lifetime granted on every successful exchange.
    pub refresh_token_lifetime: TimeDelta,
    pub monitor_interval: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            refresh_token_lifetime: DEFAULT_REFRESH_TOKEN_LIFETIME,
            monitor_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Default)]
struct RefreshLedger {
    last: Option<Result<TokenRecord, AuthError>>,
}

/// Owner of the current [`TokenRecord`].
pub struct TokenStore<P, R, N> {
    api: P,
    repo: R,
    reauth: N,
    policy: TokenPolicy,
    current: watch::Sender<Option<TokenRecord>>,
    refresh_lock: tokio::sync::Mutex<RefreshLedger>,
    attempts: AtomicU64,
}

impl<P, R, N> TokenStore<P, R, N>
where
    P: PlatformApi,
    R: TokenRepository,
    N: Reauthenticator,
{
    /// Load the stored record, falling back to `bootstrap`, which is then
    /// persisted immediately.
    ///
    /// Starting without any credential is not an error: the monitor asks for
    /// re-authentication on its first tick.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository, or
    /// [`BridgeError::Validation`] when `bootstrap` is malformed.
    #[tracing::instrument(skip_all)]
    pub async fn initialize(
        api: P,
        repo: R,
        reauth: N,
        policy: TokenPolicy,
        bootstrap: Option<TokenRecord>,
    ) -> Result<Self, BridgeError> {
        let record = match repo.load().await? {
            Some(stored) => {
                tracing::debug!(expires_at = %stored.expires_at, "token record loaded");
                Some(stored)
            }
            None => match bootstrap {
                Some(record) => {
                    record.validate()?;
                    repo.save(record.clone()).await?;
                    tracing::info!("bootstrap credential persisted");
                    Some(record)
                }
                None => {
                    tracing::warn!("no stored credential, authorization required");
                    None
                }
            },
        };

        Ok(Self {
            api,
            repo,
            reauth,
            policy,
            current: watch::Sender::new(record),
            refresh_lock: tokio::sync::Mutex::new(RefreshLedger::default()),
            attempts: AtomicU64::new(0),
        })
    }

    /// The platform client, for calls that manage their own token.
    pub fn api(&self) -> &P {
        &self.api
    }

    /// A copy of the current record.
    #[must_use]
    pub fn current(&self) -> Option<TokenRecord> {
        self.current.borrow().clone()
    }

    /// Observe every committed change of the record.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<TokenRecord>> {
        self.current.subscribe()
    }

    #[must_use]
    pub fn is_access_token_valid(&self) -> bool {
        let now = time::now();
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|record| record.is_access_token_valid_at(now))
    }

    #[must_use]
    pub fn is_refresh_token_valid(&self) -> bool {
        let now = time::now();
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|record| record.is_refresh_token_valid_at(now))
    }

    /// A usable access token, refreshing first when the current one is
    /// inside its expiry margin.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when no credential exists or the refresh
    /// failed.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.valid_access_token() {
            return Ok(token);
        }
        self.refresh()
            .await
            .map(|record| record.access_token)
    }

    fn valid_access_token(&self) -> Option<String> {
        let now = time::now();
        self.current
            .borrow()
            .as_ref()
            .filter(|record| record.is_access_token_valid_at(now))
            .map(|record| record.access_token.clone())
    }

    fn usable_refresh_token(&self) -> Result<String, AuthError> {
        let now = time::now();
        match self.current.borrow().as_ref() {
            None => Err(AuthError::MissingCredentials),
            Some(record) if !record.is_refresh_token_valid_at(now) => {
                Err(AuthError::RefreshTokenExpired)
            }
            Some(record) => Ok(record.refresh_token.clone()),
        }
    }

    /// Exchange `refresh_token` once and commit the new record. Only called
    /// while holding `refresh_lock`.
    ///
    /// A failure to persist is logged; the refreshed record stays in memory.
    #[tracing::instrument(skip_all)]
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenRecord, AuthError> {
        let grant = self
            .api
            .exchange_refresh_token(refresh_token)
            .await
            .map_err(AuthError::ExchangeRejected)?;
        let record = self.record_from(grant, Some(refresh_token))?;
        self.commit(record.clone()).await;
        tracing::info!(expires_at = %record.expires_at, "access token refreshed");
        Ok(record)
    }

    /// Refresh the current record, sharing the outcome with every caller
    /// that arrived while the exchange was running. At most one exchange is
    /// in flight at a time.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ExchangeRejected`] when the token endpoint
    /// refused, leaving the current record untouched, or
    /// [`AuthError::MissingCredentials`] / [`AuthError::RefreshTokenExpired`]
    /// when there is nothing to refresh with.
    pub async fn refresh(&self) -> Result<TokenRecord, AuthError> {
        let seen = self.attempts.load(Ordering::SeqCst);
        let mut ledger = self.refresh_lock.lock().await;
        let completed_meanwhile = self.attempts.load(Ordering::SeqCst) != seen;
        if let Some(outcome) = ledger.last.as_ref().filter(|_| completed_meanwhile) {
            tracing::debug!("joined a refresh that completed while waiting");
            return outcome.clone();
        }

        let outcome = match self.usable_refresh_token() {
            Ok(refresh_token) => self.exchange_refresh_token(&refresh_token).await,
            Err(err) => Err(err),
        };
        ledger.last = Some(outcome.clone());
        self.attempts.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Run `op` with the current access token. When the platform rejects the
    /// token, refresh once and retry `op` exactly once. When no token can be
    /// obtained, re-authentication is requested and the call fails with
    /// [`ApiError::Unauthorized`].
    ///
    /// # Errors
    ///
    /// Returns whatever `op` returns on its last attempt.
    pub async fn with_access_token<T, F, Fut>(&self, op: F) -> Result<T, ApiError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let token = match self.access_token().await {
            Ok(token) => token,
            Err(err) => {
                self.escalate(&err).await;
                return Err(ApiError::Unauthorized);
            }
        };

        match op(token).await {
            Err(ApiError::Unauthorized) => {
                tracing::info!("access token rejected, refreshing once");
                match self.refresh().await {
                    Ok(record) => op(record.access_token).await,
                    Err(err) => {
                        self.escalate(&err).await;
                        Err(ApiError::Unauthorized)
                    }
                }
            }
            other => other,
        }
    }

    /// One monitor step: refresh when the access token is inside its margin,
    /// or ask for re-authentication when that is impossible.
    #[tracing::instrument(skip(self))]
    pub async fn monitor_tick(&self) {
        if self.is_access_token_valid() {
            return;
        }
        if let Err(err) = self.refresh().await {
            tracing::warn!(error = %err, "proactive refresh failed");
            self.escalate(&err).await;
        }
    }

    /// Exchange an authorization code for a fresh record and commit it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Auth`] when the token endpoint refused the
    /// code, or [`BridgeError::Validation`] when the grant is incomplete.
    #[tracing::instrument(skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenRecord, BridgeError> {
        let grant = self
            .api
            .exchange_authorization_code(code)
            .await
            .map_err(AuthError::ExchangeRejected)?;
        let record = TokenRecord::from_grant(
            grant,
            None,
            time::now(),
            self.policy.refresh_token_lifetime,
        )?;
        self.commit(record.clone()).await;
        tracing::info!("authorization completed");
        Ok(record)
    }

    /// Drop the record in memory and in storage.
    ///
    /// # Errors
    ///
    /// Returns a storage error; the in-memory record is dropped regardless.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), BridgeError> {
        self.current.send_replace(None);
        self.repo.clear().await
    }

    fn record_from(
        &self,
        grant: TokenGrant,
        previous_refresh: Option<&str>,
    ) -> Result<TokenRecord, AuthError> {
        TokenRecord::from_grant(
            grant,
            previous_refresh,
            time::now(),
            self.policy.refresh_token_lifetime,
        )
        .map_err(|err| AuthError::ExchangeRejected(ApiError::Decode(err.to_string())))
    }

    async fn commit(&self, record: TokenRecord) {
        self.current.send_replace(Some(record.clone()));
        if let Err(err) = self.repo.save(record).await {
            tracing::error!(error = %err, "failed to persist token record, keeping it in memory");
        }
    }

    /// Ask the user to run the authorization flow again.
    pub async fn request_reauthorization(&self, reason: ReauthReason) {
        tracing::warn!(%reason, "re-authorization required");
        self.reauth.request_reauthorization(reason).await;
    }

    async fn escalate(&self, err: &AuthError) {
        let reason = match err {
            AuthError::MissingCredentials => ReauthReason::MissingCredentials,
            AuthError::RefreshTokenExpired => ReauthReason::RefreshTokenExpired,
            AuthError::ExchangeRejected(api) if api.is_transient() => {
                tracing::debug!(error = %api, "transient refresh failure, retrying on next tick");
                return;
            }
            AuthError::ExchangeRejected(_) => ReauthReason::RefreshFailed,
        };
        self.request_reauthorization(reason).await;
    }
}

impl<P, R, N> TokenStore<P, R, N>
where
    P: PlatformApi + 'static,
    R: TokenRepository + 'static,
    N: Reauthenticator + 'static,
{
    /// Start the refresh monitor on the current runtime.
    pub fn run_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let period = store.policy.monitor_interval.max(MIN_MONITOR_INTERVAL);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.monitor_tick().await;
            }
        })
    }
}

impl<P, R, N> AuthorizationHandler for TokenStore<P, R, N>
where
    P: PlatformApi,
    R: TokenRepository,
    N: Reauthenticator,
{
    async fn complete_authorization(&self, code: &str) -> Result<(), BridgeError> {
        self.exchange_code(code).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use capbridge_domain::id::DeviceId;

    use super::*;
    use crate::testing::{FakePlatform, InMemoryTokenRepo, RecordingReauth, grant};

    type Store = TokenStore<Arc<FakePlatform>, Arc<InMemoryTokenRepo>, Arc<RecordingReauth>>;

    struct Harness {
        store: Store,
        api: Arc<FakePlatform>,
        repo: Arc<InMemoryTokenRepo>,
        reauth: Arc<RecordingReauth>,
    }

    fn record(access: &str, expires_in: TimeDelta) -> TokenRecord {
        let now = time::now();
        TokenRecord {
            access_token: access.to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: now + expires_in,
            refresh_token_expires_at: now + TimeDelta::days(20),
        }
    }

    async fn harness_with(api: FakePlatform, stored: Option<TokenRecord>) -> Harness {
        let api = Arc::new(api);
        let repo = Arc::new(stored.map_or_else(InMemoryTokenRepo::default, InMemoryTokenRepo::with));
        let reauth = Arc::new(RecordingReauth::default());
        let store = TokenStore::initialize(
            Arc::clone(&api),
            Arc::clone(&repo),
            Arc::clone(&reauth),
            TokenPolicy::default(),
            None,
        )
        .await
        .unwrap();
        Harness {
            store,
            api,
            repo,
            reauth,
        }
    }

    async fn harness(stored: Option<TokenRecord>) -> Harness {
        harness_with(FakePlatform::default(), stored).await
    }

    #[tokio::test]
    async fn should_prefer_stored_record_over_bootstrap() {
        let repo = Arc::new(InMemoryTokenRepo::with(record("stored", TimeDelta::hours(1))));
        let store = TokenStore::initialize(
            Arc::new(FakePlatform::default()),
            Arc::clone(&repo),
            Arc::new(RecordingReauth::default()),
            TokenPolicy::default(),
            Some(record("bootstrap", TimeDelta::hours(1))),
        )
        .await
        .unwrap();

        assert_eq!(store.current().unwrap().access_token, "stored");
        assert_eq!(repo.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn should_persist_bootstrap_when_storage_is_empty() {
        let repo = Arc::new(InMemoryTokenRepo::default());
        let store = TokenStore::initialize(
            Arc::new(FakePlatform::default()),
            Arc::clone(&repo),
            Arc::new(RecordingReauth::default()),
            TokenPolicy::default(),
            Some(record("bootstrap", TimeDelta::hours(1))),
        )
        .await
        .unwrap();

        assert_eq!(store.current().unwrap().access_token, "bootstrap");
        assert_eq!(repo.stored().unwrap().access_token, "bootstrap");
    }

    #[tokio::test]
    async fn should_request_reauthorization_when_no_credential_exists() {
        let h = harness(None).await;

        h.store.monitor_tick().await;

        assert_eq!(h.reauth.reasons(), vec![ReauthReason::MissingCredentials]);
        assert_eq!(h.api.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn should_apply_expiry_margin_to_validity_checks() {
        let h = harness(Some(record("access-1", TimeDelta::minutes(4)))).await;

        assert!(!h.store.is_access_token_valid());
        assert!(h.store.is_refresh_token_valid());
    }

    #[tokio::test]
    async fn should_not_refresh_when_access_token_is_valid() {
        let h = harness(Some(record("access-1", TimeDelta::hours(2)))).await;

        h.store.monitor_tick().await;

        assert_eq!(h.api.refresh_calls(), 0);
        assert!(h.reauth.reasons().is_empty());
    }

    #[tokio::test]
    async fn should_refresh_once_when_token_is_inside_margin() {
        let h = harness(Some(record("access-1", TimeDelta::minutes(3)))).await;
        let mut changes = h.store.subscribe();

        h.store.monitor_tick().await;
        let token = h.store.access_token().await.unwrap();

        assert_eq!(h.api.refresh_calls(), 1);
        assert_eq!(token, "access-2");
        assert!(h.store.is_access_token_valid());
        assert!(changes.has_changed().unwrap());
        let seen = changes.borrow_and_update().clone().unwrap();
        assert_eq!(seen.access_token, "access-2");
        assert_eq!(seen.refresh_token, "refresh-2");
        assert_eq!(h.repo.stored().unwrap().access_token, "access-2");
    }

    #[tokio::test]
    async fn should_extend_refresh_token_lifetime_on_refresh() {
        let h = harness(Some(record("access-1", TimeDelta::minutes(1)))).await;

        let refreshed = h.store.refresh().await.unwrap();

        let remaining = refreshed.refresh_token_expires_at - time::now();
        assert!(remaining > TimeDelta::days(29));
    }

    #[tokio::test]
    async fn should_keep_refresh_token_when_grant_does_not_rotate_it() {
        let api = FakePlatform::default();
        *api.refresh_outcome.lock().unwrap() = Ok(grant("access-2", None));
        let h = harness_with(api, Some(record("access-1", TimeDelta::minutes(1)))).await;

        let refreshed = h.store.refresh().await.unwrap();

        assert_eq!(refreshed.refresh_token, "refresh-1");
    }

    #[tokio::test]
    async fn should_request_reauthorization_when_refresh_token_expired() {
        let mut expired = record("access-1", TimeDelta::minutes(1));
        expired.refresh_token_expires_at = time::now() + TimeDelta::minutes(2);
        let h = harness(Some(expired)).await;

        h.store.monitor_tick().await;

        assert_eq!(h.api.refresh_calls(), 0);
        assert_eq!(h.reauth.reasons(), vec![ReauthReason::RefreshTokenExpired]);
    }

    #[tokio::test]
    async fn should_request_reauthorization_and_keep_state_when_refresh_rejected() {
        let api = FakePlatform::default();
        *api.refresh_outcome.lock().unwrap() = Err(ApiError::Rejected {
            status: 400,
            body: "invalid_grant".to_string(),
        });
        let original = record("access-1", TimeDelta::minutes(1));
        let h = harness_with(api, Some(original.clone())).await;

        h.store.monitor_tick().await;

        assert_eq!(h.api.refresh_calls(), 1);
        assert_eq!(h.reauth.reasons(), vec![ReauthReason::RefreshFailed]);
        assert_eq!(h.store.current(), Some(original));
    }

    #[tokio::test]
    async fn should_not_request_reauthorization_when_refresh_fails_transiently() {
        let api = FakePlatform::default();
        *api.refresh_outcome.lock().unwrap() = Err(ApiError::Network("dns".to_string()));
        let h = harness_with(api, Some(record("access-1", TimeDelta::minutes(1)))).await;

        h.store.monitor_tick().await;

        assert!(h.reauth.reasons().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_share_one_refresh_between_concurrent_callers() {
        let api = FakePlatform {
            delay: Duration::from_millis(300),
            ..FakePlatform::default()
        };
        let h = harness_with(api, Some(record("access-1", TimeDelta::minutes(1)))).await;

        let (a, b, c) = tokio::join!(
            h.store.refresh(),
            h.store.refresh(),
            h.store.access_token(),
        );

        assert_eq!(h.api.refresh_calls(), 1);
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(c.unwrap(), "access-2");
    }

    #[tokio::test]
    async fn should_refresh_and_retry_once_when_call_is_unauthorized() {
        // the platform no longer accepts the stored token
        let h = harness(Some(record("revoked", TimeDelta::hours(2)))).await;
        *h.api.valid_token.lock().unwrap() = "access-2".to_string();

        let api = Arc::clone(&h.api);
        let status = h
            .store
            .with_access_token(|token| {
                let api = Arc::clone(&api);
                async move { api.device_status(&token, DeviceId::new()).await }
            })
            .await;

        assert!(status.is_ok());
        assert_eq!(h.api.refresh_calls(), 1);
        assert_eq!(h.api.status_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn should_request_reauthorization_when_reactive_refresh_fails() {
        let api = FakePlatform::default();
        *api.refresh_outcome.lock().unwrap() = Err(ApiError::Rejected {
            status: 401,
            body: "revoked".to_string(),
        });
        *api.valid_token.lock().unwrap() = "unreachable".to_string();
        let h = harness_with(api, Some(record("revoked", TimeDelta::hours(2)))).await;

        let api = Arc::clone(&h.api);
        let status = h
            .store
            .with_access_token(|token| {
                let api = Arc::clone(&api);
                async move { api.device_status(&token, DeviceId::new()).await }
            })
            .await;

        assert_eq!(status, Err(ApiError::Unauthorized));
        assert_eq!(h.api.status_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.reauth.reasons(), vec![ReauthReason::RefreshFailed]);
    }

    #[tokio::test]
    async fn should_keep_refreshed_record_in_memory_when_persist_fails() {
        let h = harness(Some(record("access-1", TimeDelta::minutes(1)))).await;
        *h.repo.fail_saves.lock().unwrap() = true;

        h.store.monitor_tick().await;

        assert_eq!(h.store.current().unwrap().access_token, "access-2");
        assert_eq!(h.repo.stored().unwrap().access_token, "access-1");
    }

    #[tokio::test]
    async fn should_commit_and_persist_record_when_authorization_completes() {
        let h = harness(None).await;

        h.store.complete_authorization("code-123").await.unwrap();

        assert_eq!(h.store.current().unwrap().access_token, "access-code");
        assert_eq!(h.repo.stored().unwrap().refresh_token, "refresh-code");
    }

    #[tokio::test]
    async fn should_fail_authorization_when_code_is_rejected() {
        let api = FakePlatform::default();
        *api.code_outcome.lock().unwrap() = Err(ApiError::Rejected {
            status: 400,
            body: "invalid_grant".to_string(),
        });
        let h = harness_with(api, None).await;

        let result = h.store.complete_authorization("bad").await;

        assert!(matches!(result, Err(BridgeError::Auth(_))));
        assert!(h.store.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_monitor_running_when_interval_is_zero() {
        let api = Arc::new(FakePlatform::default());
        let store = Arc::new(
            TokenStore::initialize(
                Arc::clone(&api),
                Arc::new(InMemoryTokenRepo::with(record("access-1", TimeDelta::minutes(1)))),
                Arc::new(RecordingReauth::default()),
                TokenPolicy {
                    monitor_interval: Duration::ZERO,
                    ..TokenPolicy::default()
                },
                None,
            )
            .await
            .unwrap(),
        );

        let monitor = store.run_monitor();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(!monitor.is_finished());
        assert_eq!(api.refresh_calls(), 1);
        monitor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn should_run_one_exchange_when_monitor_and_callers_race() {
        let api = FakePlatform {
            delay: Duration::from_millis(300),
            ..FakePlatform::default()
        };
        let h = harness_with(api, Some(record("access-1", TimeDelta::minutes(1)))).await;

        let ((), refreshed, token) = tokio::join!(
            h.store.monitor_tick(),
            h.store.refresh(),
            h.store.access_token(),
        );

        assert_eq!(h.api.refresh_calls(), 1);
        assert_eq!(refreshed.unwrap().access_token, "access-2");
        assert_eq!(token.unwrap(), "access-2");
    }

    #[tokio::test]
    async fn should_clear_record_in_memory_and_storage() {
        let h = harness(Some(record("access-1", TimeDelta::hours(1)))).await;

        h.store.clear().await.unwrap();

        assert!(h.store.current().is_none());
        assert!(h.repo.stored().is_none());
    }
}
