//! Discovery: list devices once at startup and build their synchronizers.
//!
//! Transient network failures are retried with bounded exponential backoff;
//! this is the only place in the bridge that retries remote calls. Auth
//! failures are never retried here. A terminal failure is recorded as a
//! `discovery` crash so repeated failed startups trip the crash-loop manager.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use capbridge_domain::adapter::{AdapterBinding, AdapterKind};
use capbridge_domain::crash::CrashKind;
use capbridge_domain::device::Device;
use capbridge_domain::error::{ApiError, BridgeError};
use capbridge_domain::id::LocationId;

use crate::ports::{AdapterFactory, CrashRepository, PlatformApi, Reauthenticator, TokenRepository};
use crate::services::authorized_gateway::AuthorizedGateway;
use crate::services::capability_resolver::CapabilityResolver;
use crate::services::crash_loop::CrashLoopManager;
use crate::services::device_synchronizer::{DeviceSynchronizer, SyncConfig};
use crate::services::token_store::TokenStore;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Which devices to expose and how hard to try listing them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Location names or ids to keep; empty keeps every location.
    pub locations: Vec<String>,
    /// Device labels to skip, compared case-insensitively.
    pub ignored_labels: Vec<String>,
    /// Total attempts per listing call, first one included.
    pub max_attempts: u32,
    #[serde(rename = "initial_backoff_ms", deserialize_with = "millis")]
    pub initial_backoff: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            ignored_labels: Vec::new(),
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

fn millis<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

/// Synchronizer settings per device class.
///
/// A device's class is given by the adapter kinds it resolved to; when several
/// kinds carry an override the shortest interval wins.
#[derive(Debug, Clone, Default)]
pub struct PollingPlan {
    pub defaults: SyncConfig,
    pub intervals: BTreeMap<AdapterKind, Duration>,
}

impl PollingPlan {
    #[must_use]
    pub fn config_for(&self, bindings: &[AdapterBinding]) -> SyncConfig {
        let polling_interval = bindings
            .iter()
            .filter_map(|binding| self.intervals.get(&binding.kind).copied())
            .min()
            .unwrap_or(self.defaults.polling_interval);
        SyncConfig {
            polling_interval,
            ..self.defaults.clone()
        }
    }
}

pub type BridgeSynchronizer<P, R, N> = DeviceSynchronizer<AuthorizedGateway<P, R, N>>;

/// Startup discovery.
pub struct DiscoveryService<P, R, N> {
    tokens: Arc<TokenStore<P, R, N>>,
    resolver: CapabilityResolver,
    config: DiscoveryConfig,
    polling: PollingPlan,
}

impl<P, R, N> DiscoveryService<P, R, N>
where
    P: PlatformApi + 'static,
    R: TokenRepository + 'static,
    N: Reauthenticator + 'static,
{
    #[must_use]
    pub fn new(
        tokens: Arc<TokenStore<P, R, N>>,
        resolver: CapabilityResolver,
        config: DiscoveryConfig,
        polling: PollingPlan,
    ) -> Self {
        Self {
            tokens,
            resolver,
            config,
            polling,
        }
    }

    /// List, filter and resolve every device, building one synchronizer per
    /// device that resolved to at least one adapter.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Api`] when listing failed for good; a
    /// `discovery` crash entry has been recorded by then.
    #[tracing::instrument(skip_all)]
    pub async fn discover<C: CrashRepository>(
        &self,
        factory: &dyn AdapterFactory<AuthorizedGateway<P, R, N>>,
        crashes: &CrashLoopManager<C>,
    ) -> Result<Vec<Arc<BridgeSynchronizer<P, R, N>>>, BridgeError> {
        let devices = match self.list_devices().await {
            Ok(devices) => devices,
            Err(err) => {
                tracing::error!(error = %err, "discovery failed");
                if let Err(storage) = crashes.record_potential_crash(CrashKind::Discovery).await {
                    tracing::error!(error = %storage, "failed to record discovery crash");
                }
                return Err(err.into());
            }
        };

        let mut synchronizers = Vec::new();
        for device in devices {
            let bindings = self.resolver.resolve_device(&device);
            if bindings.is_empty() {
                tracing::info!(device = %device.label, "no supported capabilities, skipped");
                continue;
            }
            tracing::info!(device = %device.label, adapters = bindings.len(), "device registered");
            let config = self.polling.config_for(&bindings);
            synchronizers.push(DeviceSynchronizer::new(
                device,
                AuthorizedGateway::new(Arc::clone(&self.tokens)),
                config,
                bindings,
                factory,
            ));
        }
        Ok(synchronizers)
    }

    async fn list_devices(&self) -> Result<Vec<Device>, ApiError> {
        let api = self.tokens.api();
        let devices = self
            .with_backoff("list devices", || {
                self.tokens
                    .with_access_token(|token| async move { api.list_devices(&token).await })
            })
            .await?;
        let total = devices.len();

        let allowed = self.allowed_locations().await?;
        let devices: Vec<Device> = devices
            .into_iter()
            .filter(|device| match &allowed {
                Some(allowed) => device
                    .location_id
                    .is_some_and(|location| allowed.contains(&location)),
                None => true,
            })
            .filter(|device| {
                !self
                    .config
                    .ignored_labels
                    .iter()
                    .any(|label| label.eq_ignore_ascii_case(&device.label))
            })
            .collect();
        tracing::debug!(total, kept = devices.len(), "devices listed");
        Ok(devices)
    }

    async fn allowed_locations(&self) -> Result<Option<HashSet<LocationId>>, ApiError> {
        if self.config.locations.is_empty() {
            return Ok(None);
        }
        let api = self.tokens.api();
        let locations = self
            .with_backoff("list locations", || {
                self.tokens
                    .with_access_token(|token| async move { api.list_locations(&token).await })
            })
            .await?;
        let allowed = locations
            .into_iter()
            .filter(|location| {
                let id = location.id.to_string();
                self.config
                    .locations
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(&location.name) || *wanted == id)
            })
            .map(|location| location.id)
            .collect();
        Ok(Some(allowed))
    }

    async fn with_backoff<T, F, Fut>(&self, what: &'static str, op: F) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut delay = self.config.initial_backoff.min(MAX_BACKOFF);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.config.max_attempts => {
                    tracing::warn!(attempt, ?delay, error = %err, "{what} failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
