//! Crash-loop manager: process-level failure window and recovery.
//!
//! Each startup-critical failure is recorded with a timestamp and a kind.
//! When too many land inside the rolling window the process is considered to
//! be crash-looping: the credential is discarded and the user is asked to
//! authorize again. This is distinct from per-device failure counting.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;

use capbridge_domain::crash::{CrashEntry, CrashKind, CrashWindow};
use capbridge_domain::error::BridgeError;
use capbridge_domain::time::{self, Timestamp};

use crate::ports::{CrashRepository, PlatformApi, ReauthReason, Reauthenticator, TokenRepository};
use crate::services::token_store::TokenStore;

/// Detection thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrashLoopConfig {
    /// Entries inside the window that count as a loop.
    #[serde(rename = "count")]
    pub max_failures: usize,
    /// Rolling window length, in seconds.
    #[serde(rename = "window_secs", with = "secs")]
    pub window: Duration,
    /// Kinds that count toward detection; empty counts every kind.
    pub kinds: Vec<CrashKind>,
}

impl Default for CrashLoopConfig {
    fn default() -> Self {
        Self {
            max_failures: 3,
            window: Duration::from_secs(300),
            kinds: Vec::new(),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Records potential crashes and decides when to wipe the credential.
pub struct CrashLoopManager<R> {
    repo: R,
    config: CrashLoopConfig,
    window: Mutex<CrashWindow>,
}

impl<R: CrashRepository> CrashLoopManager<R> {
    /// Load the persisted window.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn load(repo: R, config: CrashLoopConfig) -> Result<Self, BridgeError> {
        let window = repo.load().await?;
        tracing::debug!(entries = window.entries().len(), "crash window loaded");
        Ok(Self {
            repo,
            config,
            window: Mutex::new(window),
        })
    }

    #[must_use]
    pub fn config(&self) -> &CrashLoopConfig {
        &self.config
    }

    /// Record a failure now.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the window could not be persisted.
    pub async fn record_potential_crash(&self, kind: CrashKind) -> Result<(), BridgeError> {
        self.record_at(kind, time::now()).await
    }

    /// Record a failure at `timestamp`, prune, persist.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the window could not be persisted.
    #[tracing::instrument(skip(self))]
    pub async fn record_at(&self, kind: CrashKind, timestamp: Timestamp) -> Result<(), BridgeError> {
        let mut window = self.window.lock().await;
        window.push(CrashEntry { timestamp, kind });
        window.prune(time::now(), time::delta(self.config.window));
        tracing::info!(%kind, entries = window.entries().len(), "potential crash recorded");
        self.repo.save(window.clone()).await
    }

    /// Whether the pruned window holds at least `max_failures` matching
    /// entries.
    pub async fn is_crash_loop_detected(&self) -> bool {
        let mut window = self.window.lock().await;
        window.prune(time::now(), time::delta(self.config.window));
        window.count(&self.config.kinds) >= self.config.max_failures
    }

    /// Entries currently held, oldest first.
    pub async fn entries(&self) -> Vec<CrashEntry> {
        self.window.lock().await.entries().to_vec()
    }

    /// Check for a crash loop and, when one is detected, recover
    /// destructively: clear the credential, clear the window, request
    /// re-authentication.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::CrashLoopDetected`] after recovering, or a
    /// storage error when recovery itself could not be persisted.
    #[tracing::instrument(skip_all)]
    pub async fn evaluate_and_recover<P, T, N>(
        &self,
        tokens: &TokenStore<P, T, N>,
    ) -> Result<(), BridgeError>
    where
        P: PlatformApi,
        T: TokenRepository,
        N: Reauthenticator,
    {
        let count = {
            let mut window = self.window.lock().await;
            window.prune(time::now(), time::delta(self.config.window));
            let count = window.count(&self.config.kinds);
            if count < self.config.max_failures {
                return Ok(());
            }
            tracing::error!(count, "crash loop detected, discarding credential");
            tokens.clear().await?;
            window.clear();
            self.repo.save(window.clone()).await?;
            count
        };
        tokens.request_reauthorization(ReauthReason::CrashLoop).await;
        Err(BridgeError::CrashLoopDetected {
            count,
            window_secs: self.config.window.as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeDelta;

    use capbridge_domain::token::TokenRecord;

    use super::*;
    use crate::services::token_store::TokenPolicy;
    use crate::testing::{FakePlatform, InMemoryCrashRepo, InMemoryTokenRepo, RecordingReauth};

    async fn manager(config: CrashLoopConfig) -> (CrashLoopManager<Arc<InMemoryCrashRepo>>, Arc<InMemoryCrashRepo>) {
        let repo = Arc::new(InMemoryCrashRepo::default());
        let manager = CrashLoopManager::load(Arc::clone(&repo), config).await.unwrap();
        (manager, repo)
    }

    async fn token_store(
        repo: Arc<InMemoryTokenRepo>,
        reauth: Arc<RecordingReauth>,
    ) -> TokenStore<FakePlatform, Arc<InMemoryTokenRepo>, Arc<RecordingReauth>> {
        let record = TokenRecord::bootstrap("access-1", "refresh-1", time::now()).unwrap();
        TokenStore::initialize(
            FakePlatform::default(),
            repo,
            reauth,
            TokenPolicy::default(),
            Some(record),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn should_not_detect_loop_below_threshold() {
        let (manager, _) = manager(CrashLoopConfig::default()).await;

        manager.record_potential_crash(CrashKind::Discovery).await.unwrap();
        manager.record_potential_crash(CrashKind::Discovery).await.unwrap();

        assert!(!manager.is_crash_loop_detected().await);
    }

    #[tokio::test]
    async fn should_detect_loop_at_threshold() {
        let (manager, repo) = manager(CrashLoopConfig::default()).await;

        for _ in 0..3 {
            manager.record_potential_crash(CrashKind::Initialization).await.unwrap();
        }

        assert!(manager.is_crash_loop_detected().await);
        assert_eq!(repo.stored().entries().len(), 3);
    }

    #[tokio::test]
    async fn should_prune_entries_outside_window() {
        let (manager, repo) = manager(CrashLoopConfig::default()).await;
        let old = time::now() - TimeDelta::minutes(10);

        manager.record_at(CrashKind::Discovery, old).await.unwrap();
        manager.record_at(CrashKind::Discovery, old).await.unwrap();
        manager.record_potential_crash(CrashKind::Discovery).await.unwrap();

        assert!(!manager.is_crash_loop_detected().await);
        assert_eq!(repo.stored().entries().len(), 1);
    }

    #[tokio::test]
    async fn should_only_count_configured_kinds() {
        let (manager, _) = manager(CrashLoopConfig {
            kinds: vec![CrashKind::Authentication],
            ..CrashLoopConfig::default()
        })
        .await;

        for _ in 0..5 {
            manager.record_potential_crash(CrashKind::Discovery).await.unwrap();
        }
        assert!(!manager.is_crash_loop_detected().await);

        for _ in 0..3 {
            manager.record_potential_crash(CrashKind::Authentication).await.unwrap();
        }
        assert!(manager.is_crash_loop_detected().await);
    }

    #[tokio::test]
    async fn should_restore_persisted_window_on_load() {
        let repo = Arc::new(InMemoryCrashRepo::default());
        {
            let first = CrashLoopManager::load(Arc::clone(&repo), CrashLoopConfig::default())
                .await
                .unwrap();
            for _ in 0..3 {
                first.record_potential_crash(CrashKind::Unknown).await.unwrap();
            }
        }

        let second = CrashLoopManager::load(repo, CrashLoopConfig::default()).await.unwrap();

        assert!(second.is_crash_loop_detected().await);
    }

    #[tokio::test]
    async fn should_wipe_token_and_request_reauthorization_when_loop_detected() {
        let (manager, crash_repo) = manager(CrashLoopConfig::default()).await;
        let token_repo = Arc::new(InMemoryTokenRepo::default());
        let reauth = Arc::new(RecordingReauth::default());
        let tokens = token_store(Arc::clone(&token_repo), Arc::clone(&reauth)).await;
        for _ in 0..3 {
            manager.record_potential_crash(CrashKind::Discovery).await.unwrap();
        }

        let result = manager.evaluate_and_recover(&tokens).await;

        assert!(matches!(
            result,
            Err(BridgeError::CrashLoopDetected { count: 3, window_secs: 300 })
        ));
        assert!(tokens.current().is_none());
        assert!(token_repo.stored().is_none());
        assert!(crash_repo.stored().is_empty());
        assert_eq!(reauth.reasons(), vec![ReauthReason::CrashLoop]);
        // recovery does not re-trigger on the same entries
        assert!(manager.evaluate_and_recover(&tokens).await.is_ok());
    }

    #[tokio::test]
    async fn should_leave_token_alone_when_no_loop() {
        let (manager, _) = manager(CrashLoopConfig::default()).await;
        let reauth = Arc::new(RecordingReauth::default());
        let tokens = token_store(Arc::new(InMemoryTokenRepo::default()), Arc::clone(&reauth)).await;
        manager.record_potential_crash(CrashKind::Discovery).await.unwrap();

        manager.evaluate_and_recover(&tokens).await.unwrap();

        assert!(tokens.current().is_some());
        assert!(reauth.reasons().is_empty());
    }
}
