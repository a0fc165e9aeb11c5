//! Device synchronizer: one per device.
//!
//! Owns the device's status cache, serializes its command batches, runs its
//! polling timer and its online/offline state machine. Adapters read status
//! and issue commands only through it.
//!
//! ## Ordering
//! - command batches are strictly serialized (FIFO);
//! - a status fetch never starts while a command is in flight;
//! - concurrent status fetches collapse into one remote call whose outcome
//!   every waiter observes.
//!
//! Devices are independent: nothing here is shared across synchronizers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use capbridge_domain::adapter::AdapterBinding;
use capbridge_domain::command::Command;
use capbridge_domain::device::Device;
use capbridge_domain::error::{ApiError, BridgeError};
use capbridge_domain::event::DeviceEvent;
use capbridge_domain::id::DeviceId;
use capbridge_domain::status::StatusSnapshot;
use capbridge_domain::time;

use crate::ports::{Adapter, AdapterContext, AdapterFactory, DeviceGateway};

/// Timing and threshold knobs of a synchronizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base period between poll ticks.
    pub polling_interval: Duration,
    /// How long a fetched snapshot is served from cache.
    pub staleness: Duration,
    /// Consecutive status failures that take the device offline.
    pub failure_threshold: u32,
    /// Minimum time offline before a healthy probe brings it back.
    pub offline_cooldown: Duration,
    /// Quiet period after a command before polling resumes.
    pub command_settle: Duration,
    /// Upper bound of the random delay added to every tick.
    pub max_jitter: Duration,
    /// Status arrives through pushed events; polling is disabled.
    pub event_push: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(10),
            staleness: Duration::from_secs(5),
            failure_threshold: 5,
            offline_cooldown: Duration::from_secs(600),
            command_settle: Duration::from_secs(20),
            max_jitter: Duration::from_secs(1),
            event_push: false,
        }
    }
}

type FetchOutcome = Result<Arc<StatusSnapshot>, ApiError>;

#[derive(Default)]
struct State {
    snapshot: Option<Arc<StatusSnapshot>>,
    fetched_at: Option<Instant>,
    in_flight: Option<broadcast::Sender<FetchOutcome>>,
    consecutive_failures: u32,
    offline_since: Option<Instant>,
    last_command_at: Option<Instant>,
}

impl State {
    fn is_online(&self) -> bool {
        self.offline_since.is_none()
    }

    fn fresh_snapshot(&self, staleness: Duration) -> Option<Arc<StatusSnapshot>> {
        let fetched_at = self.fetched_at?;
        if fetched_at.elapsed() < staleness {
            self.snapshot.clone()
        } else {
            None
        }
    }
}

enum Role {
    Leader(broadcast::Sender<FetchOutcome>),
    Follower(broadcast::Receiver<FetchOutcome>),
}

/// Clears the in-flight marker if the leading fetch is dropped mid-way, so
/// the next caller starts a new fetch instead of waiting forever.
struct InFlightGuard<'a> {
    state: &'a Mutex<State>,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.state).in_flight = None;
        }
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-device command/status coordinator.
pub struct DeviceSynchronizer<G> {
    device: Device,
    gateway: G,
    config: SyncConfig,
    state: Mutex<State>,
    command_lock: tokio::sync::Mutex<()>,
    adapters: Vec<Arc<dyn Adapter>>,
}

impl<G> DeviceSynchronizer<G> {
    /// Create the synchronizer and build one adapter per binding.
    ///
    /// Adapters receive a weak handle back to the synchronizer, so the
    /// synchronizer owns its adapters and not the other way round.
    pub fn new(
        device: Device,
        gateway: G,
        config: SyncConfig,
        bindings: Vec<AdapterBinding>,
        factory: &dyn AdapterFactory<G>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let adapters = bindings
                .into_iter()
                .map(|binding| {
                    factory.build(AdapterContext::new(
                        binding,
                        device.id,
                        device.label.clone(),
                        weak.clone(),
                    ))
                })
                .collect();
            Self {
                device,
                gateway,
                config,
                state: Mutex::new(State::default()),
                command_lock: tokio::sync::Mutex::new(()),
                adapters,
            }
        })
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[must_use]
    pub fn device_id(&self) -> DeviceId {
        self.device.id
    }

    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    #[must_use]
    pub fn adapters(&self) -> &[Arc<dyn Adapter>] {
        &self.adapters
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Last fetched snapshot regardless of age.
    #[must_use]
    pub fn cached_snapshot(&self) -> Option<Arc<StatusSnapshot>> {
        lock(&self.state).snapshot.clone()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        lock(&self.state).is_online()
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        lock(&self.state).consecutive_failures
    }

    fn ensure_online(&self) -> Result<(), BridgeError> {
        if self.is_online() {
            Ok(())
        } else {
            Err(BridgeError::Unreachable(self.device.id))
        }
    }
}

impl<G: DeviceGateway + 'static> DeviceSynchronizer<G> {
    /// Return a status snapshot, fetching it only when the cache is stale.
    ///
    /// `force` bypasses the cache but still joins a fetch already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unreachable`] while the device is offline, or
    /// [`BridgeError::StatusFailed`] when the remote call failed.
    #[tracing::instrument(skip(self), fields(device_id = %self.device.id))]
    pub async fn refresh_status(&self, force: bool) -> Result<Arc<StatusSnapshot>, BridgeError> {
        loop {
            let role = {
                let mut state = lock(&self.state);
                if !state.is_online() {
                    return Err(BridgeError::Unreachable(self.device.id));
                }
                let cached = state
                    .fresh_snapshot(self.config.staleness)
                    .filter(|_| !force);
                if let Some(snapshot) = cached {
                    return Ok(snapshot);
                }
                match state.in_flight.as_ref().map(broadcast::Sender::subscribe) {
                    Some(receiver) => Role::Follower(receiver),
                    None => {
                        let (sender, _) = broadcast::channel(1);
                        state.in_flight = Some(sender.clone());
                        Role::Leader(sender)
                    }
                }
            };

            let outcome = match role {
                Role::Leader(sender) => self.lead_fetch(&sender).await,
                Role::Follower(mut receiver) => match receiver.recv().await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::debug!("status fetch abandoned, retrying");
                        continue;
                    }
                },
            };
            return outcome.map_err(|source| BridgeError::StatusFailed {
                device_id: self.device.id,
                source,
            });
        }
    }

    async fn lead_fetch(&self, sender: &broadcast::Sender<FetchOutcome>) -> FetchOutcome {
        let mut guard = InFlightGuard {
            state: &self.state,
            armed: true,
        };

        drop(self.command_lock.lock().await);

        let outcome = self
            .gateway
            .fetch_status(self.device.id)
            .await
            .map(|components| Arc::new(StatusSnapshot::new(components, time::now())));

        guard.armed = false;
        let went_offline = {
            let mut state = lock(&self.state);
            state.in_flight = None;
            match &outcome {
                Ok(snapshot) => {
                    state.snapshot = Some(Arc::clone(snapshot));
                    state.fetched_at = Some(Instant::now());
                    state.consecutive_failures = 0;
                    false
                }
                Err(err) => {
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                    tracing::warn!(
                        error = %err,
                        failures = state.consecutive_failures,
                        "status fetch failed"
                    );
                    if state.is_online()
                        && state.consecutive_failures >= self.config.failure_threshold
                    {
                        state.offline_since = Some(Instant::now());
                        true
                    } else {
                        false
                    }
                }
            }
        };

        match &outcome {
            Ok(snapshot) => self.notify_status(snapshot),
            Err(_) if went_offline => {
                tracing::warn!(device = %self.device.label, "device marked offline");
                self.notify_reachable(false);
            }
            Err(_) => {}
        }

        // no receivers is fine
        let _ = sender.send(outcome.clone());
        outcome
    }

    /// Send one command batch to the device.
    ///
    /// Batches are strictly serialized per device. Nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Unreachable`] while the device is offline, or
    /// [`BridgeError::CommandFailed`] when the platform did not accept the
    /// batch. A failed batch never takes the device offline.
    #[tracing::instrument(skip(self, commands), fields(device_id = %self.device.id, count = commands.len()))]
    pub async fn send_commands(&self, commands: &[Command]) -> Result<(), BridgeError> {
        if commands.is_empty() {
            return Ok(());
        }
        self.ensure_online()?;

        let _permit = self.command_lock.lock().await;
        self.ensure_online()?;

        let result = self.gateway.post_commands(self.device.id, commands).await;
        {
            let mut state = lock(&self.state);
            state.last_command_at = Some(Instant::now());
            if result.is_ok() {
                state.fetched_at = None;
            }
        }
        result.map_err(|source| {
            tracing::warn!(error = %source, "command batch failed");
            BridgeError::CommandFailed {
                device_id: self.device.id,
                source,
            }
        })
    }

    /// One polling step. Failures are logged and absorbed.
    ///
    /// In event-push mode only the health probe of an offline device runs.
    pub async fn poll_tick(&self) {
        if self.config.event_push && self.is_online() {
            return;
        }
        if self.command_lock.try_lock().is_err() {
            tracing::trace!(device_id = %self.device.id, "command in flight, tick skipped");
            return;
        }

        let (online, settling) = {
            let state = lock(&self.state);
            let settling = state
                .last_command_at
                .is_some_and(|at| at.elapsed() < self.config.command_settle);
            (state.is_online(), settling)
        };
        if settling {
            tracing::trace!(device_id = %self.device.id, "waiting for last command to settle");
            return;
        }

        if online {
            if let Err(err) = self.refresh_status(false).await {
                tracing::debug!(device_id = %self.device.id, error = %err, "poll failed");
            }
        } else {
            self.probe_health().await;
        }
    }

    async fn probe_health(&self) {
        let health = match self.gateway.fetch_health(self.device.id).await {
            Ok(health) => health,
            Err(err) => {
                tracing::debug!(device_id = %self.device.id, error = %err, "health probe failed");
                return;
            }
        };
        if !health.is_online() {
            return;
        }

        let recovered = {
            let mut state = lock(&self.state);
            let cooled_down = state
                .offline_since
                .is_some_and(|since| since.elapsed() >= self.config.offline_cooldown);
            if cooled_down {
                state.offline_since = None;
                state.consecutive_failures = 0;
                state.fetched_at = None;
            }
            cooled_down
        };
        if recovered {
            tracing::info!(device = %self.device.label, "device back online");
            self.notify_reachable(true);
            if let Err(err) = self.refresh_status(true).await {
                tracing::debug!(device_id = %self.device.id, error = %err, "refresh after recovery failed");
            }
        }
    }

    /// Start the polling timer on the current runtime.
    ///
    /// The task holds only a weak handle and stops once the synchronizer is
    /// dropped.
    pub fn start_polling(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let interval = self.config.polling_interval;
        let max_jitter = self.config.max_jitter;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval + jitter(max_jitter)).await;
                let Some(sync) = weak.upgrade() else {
                    break;
                };
                sync.poll_tick().await;
            }
        })
    }

    /// Route a pushed event to the adapter bound to its component and
    /// capability. The status cache is left untouched.
    ///
    /// Returns `false` when no adapter owns the event.
    pub fn process_event(&self, event: &DeviceEvent) -> bool {
        let target = self.adapters.iter().find(|adapter| {
            let binding = adapter.binding();
            binding.component_id == event.component_id && binding.owns(event.capability.as_str())
        });
        match target {
            Some(adapter) => {
                adapter.process_event(event);
                true
            }
            None => {
                tracing::trace!(
                    device_id = %self.device.id,
                    component_id = %event.component_id,
                    capability = %event.capability,
                    "no adapter for event"
                );
                false
            }
        }
    }

    fn notify_status(&self, snapshot: &StatusSnapshot) {
        for adapter in &self.adapters {
            adapter.on_status(snapshot.component(adapter.binding().component_id.as_str()));
        }
    }

    fn notify_reachable(&self, reachable: bool) {
        for adapter in &self.adapters {
            adapter.set_reachable(reachable);
        }
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
