//! In-memory fakes of every port, shared by the service tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use capbridge_domain::adapter::AdapterBinding;
use capbridge_domain::capability::{Capability, ComponentId};
use capbridge_domain::command::Command;
use capbridge_domain::crash::CrashWindow;
use capbridge_domain::device::{Device, Location};
use capbridge_domain::error::{ApiError, BridgeError};
use capbridge_domain::event::DeviceEvent;
use capbridge_domain::id::DeviceId;
use capbridge_domain::status::{ComponentStatus, HealthState};
use capbridge_domain::token::{TokenGrant, TokenRecord};

use crate::ports::platform::ComponentStatuses;
use crate::ports::{
    Adapter, CrashRepository, DeviceGateway, PlatformApi, ReauthReason, Reauthenticator,
    TokenRepository,
};

pub(crate) fn cap(id: &str) -> Capability {
    Capability::new(id).unwrap()
}

/// A one-component status tree: `{capability: {attribute: {value}}}`.
pub(crate) fn status(capability: &str, attribute: &str, value: serde_json::Value) -> ComponentStatuses {
    let mut attributes = serde_json::Map::new();
    attributes.insert(attribute.to_string(), serde_json::json!({ "value": value }));
    let mut tree = serde_json::Map::new();
    tree.insert(capability.to_string(), serde_json::Value::Object(attributes));
    BTreeMap::from([(ComponentId::main(), ComponentStatus::new(tree))])
}

// ---------------------------------------------------------------------------
// DeviceGateway
// ---------------------------------------------------------------------------

/// Scripted gateway. Queued outcomes are consumed first, then the defaults
/// apply. Every call can be delayed to widen race windows.
pub(crate) struct FakeGateway {
    pub status_outcomes: Mutex<VecDeque<Result<ComponentStatuses, ApiError>>>,
    pub default_status: Mutex<Result<ComponentStatuses, ApiError>>,
    pub health: Mutex<Result<HealthState, ApiError>>,
    pub command_outcome: Mutex<Result<(), ApiError>>,
    pub delay: Duration,
    pub status_calls: AtomicUsize,
    pub health_calls: AtomicUsize,
    /// `("start"|"end", first command name)` in call order.
    pub command_log: Mutex<Vec<(&'static str, String)>>,
    /// Set when a status call starts while a command is between start/end.
    pub overlap_seen: Mutex<bool>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            status_outcomes: Mutex::new(VecDeque::new()),
            default_status: Mutex::new(Ok(status("switch", "switch", "on".into()))),
            health: Mutex::new(Ok(HealthState::Online)),
            command_outcome: Mutex::new(Ok(())),
            delay: Duration::ZERO,
            status_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            command_log: Mutex::new(Vec::new()),
            overlap_seen: Mutex::new(false),
        }
    }
}

impl FakeGateway {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        let gateway = Self::default();
        *gateway.default_status.lock().unwrap() = Err(ApiError::Network("timeout".to_string()));
        gateway
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn command_running(&self) -> bool {
        let log = self.command_log.lock().unwrap();
        log.iter().filter(|(phase, _)| *phase == "start").count()
            > log.iter().filter(|(phase, _)| *phase == "end").count()
    }
}

impl DeviceGateway for FakeGateway {
    async fn fetch_status(&self, _device_id: DeviceId) -> Result<ComponentStatuses, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.command_running() {
            *self.overlap_seen.lock().unwrap() = true;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let queued = self.status_outcomes.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| self.default_status.lock().unwrap().clone())
    }

    async fn fetch_health(&self, _device_id: DeviceId) -> Result<HealthState, ApiError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        self.health.lock().unwrap().clone()
    }

    async fn post_commands(&self, _device_id: DeviceId, commands: &[Command]) -> Result<(), ApiError> {
        let name = commands.first().map(|c| c.command.clone()).unwrap_or_default();
        self.command_log.lock().unwrap().push(("start", name.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.command_log.lock().unwrap().push(("end", name));
        self.command_outcome.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// PlatformApi
// ---------------------------------------------------------------------------

/// Scripted platform. Device calls succeed only with `valid_token`, mimicking
/// a 401 for anything else.
pub(crate) struct FakePlatform {
    pub valid_token: Mutex<String>,
    pub locations: Mutex<Vec<Location>>,
    pub devices: Mutex<Vec<Device>>,
    pub list_failures: Mutex<VecDeque<ApiError>>,
    pub refresh_outcome: Mutex<Result<TokenGrant, ApiError>>,
    pub code_outcome: Mutex<Result<TokenGrant, ApiError>>,
    pub delay: Duration,
    pub refresh_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            valid_token: Mutex::new("access-1".to_string()),
            locations: Mutex::new(Vec::new()),
            devices: Mutex::new(Vec::new()),
            list_failures: Mutex::new(VecDeque::new()),
            refresh_outcome: Mutex::new(Ok(grant("access-2", Some("refresh-2")))),
            code_outcome: Mutex::new(Ok(grant("access-code", Some("refresh-code")))),
            delay: Duration::ZERO,
            refresh_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }
}

pub(crate) fn grant(access: &str, refresh: Option<&str>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.map(ToString::to_string),
        expires_in: 86_400,
    }
}

impl FakePlatform {
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn authorize(&self, access_token: &str) -> Result<(), ApiError> {
        if *self.valid_token.lock().unwrap() == access_token {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

impl PlatformApi for FakePlatform {
    async fn list_locations(&self, access_token: &str) -> Result<Vec<Location>, ApiError> {
        self.authorize(access_token)?;
        Ok(self.locations.lock().unwrap().clone())
    }

    async fn list_devices(&self, access_token: &str) -> Result<Vec<Device>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.authorize(access_token)?;
        let failure = self.list_failures.lock().unwrap().pop_front();
        match failure {
            Some(err) => Err(err),
            None => Ok(self.devices.lock().unwrap().clone()),
        }
    }

    async fn device_status(
        &self,
        access_token: &str,
        _device_id: DeviceId,
    ) -> Result<ComponentStatuses, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.authorize(access_token)?;
        Ok(status("switch", "switch", "on".into()))
    }

    async fn device_health(
        &self,
        access_token: &str,
        _device_id: DeviceId,
    ) -> Result<HealthState, ApiError> {
        self.authorize(access_token)?;
        Ok(HealthState::Online)
    }

    async fn send_commands(
        &self,
        access_token: &str,
        _device_id: DeviceId,
        _commands: &[Command],
    ) -> Result<(), ApiError> {
        self.authorize(access_token)
    }

    async fn exchange_authorization_code(&self, _code: &str) -> Result<TokenGrant, ApiError> {
        let outcome = self.code_outcome.lock().unwrap().clone();
        if let Ok(grant) = &outcome {
            *self.valid_token.lock().unwrap() = grant.access_token.clone();
        }
        outcome
    }

    async fn exchange_refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = self.refresh_outcome.lock().unwrap().clone();
        if let Ok(grant) = &outcome {
            *self.valid_token.lock().unwrap() = grant.access_token.clone();
        }
        outcome
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct InMemoryTokenRepo {
    pub record: Mutex<Option<TokenRecord>>,
    pub fail_saves: Mutex<bool>,
    pub saves: AtomicUsize,
}

impl InMemoryTokenRepo {
    pub fn with(record: TokenRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Option<TokenRecord> {
        self.record.lock().unwrap().clone()
    }
}

impl TokenRepository for InMemoryTokenRepo {
    async fn load(&self) -> Result<Option<TokenRecord>, BridgeError> {
        Ok(self.stored())
    }

    async fn save(&self, record: TokenRecord) -> Result<(), BridgeError> {
        if *self.fail_saves.lock().unwrap() {
            return Err(BridgeError::Storage("disk full".into()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.record.lock().unwrap() = Some(record);
        Ok(())
    }

    async fn clear(&self) -> Result<(), BridgeError> {
        *self.record.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryCrashRepo {
    pub window: Mutex<CrashWindow>,
}

impl InMemoryCrashRepo {
    pub fn stored(&self) -> CrashWindow {
        self.window.lock().unwrap().clone()
    }
}

impl CrashRepository for InMemoryCrashRepo {
    async fn load(&self) -> Result<CrashWindow, BridgeError> {
        Ok(self.stored())
    }

    async fn save(&self, window: CrashWindow) -> Result<(), BridgeError> {
        *self.window.lock().unwrap() = window;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reauthenticator
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct RecordingReauth {
    pub reasons: Mutex<Vec<ReauthReason>>,
}

impl RecordingReauth {
    pub fn reasons(&self) -> Vec<ReauthReason> {
        self.reasons.lock().unwrap().clone()
    }
}

impl Reauthenticator for RecordingReauth {
    async fn request_reauthorization(&self, reason: ReauthReason) {
        self.reasons.lock().unwrap().push(reason);
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub(crate) struct RecordingAdapter {
    binding: AdapterBinding,
    pub statuses: Mutex<Vec<Option<ComponentStatus>>>,
    pub events: Mutex<Vec<DeviceEvent>>,
    pub reachability: Mutex<Vec<bool>>,
}

impl RecordingAdapter {
    pub fn new(binding: AdapterBinding) -> Self {
        Self {
            binding,
            statuses: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            reachability: Mutex::new(Vec::new()),
        }
    }

    pub fn status_count(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }

    pub fn reachability(&self) -> Vec<bool> {
        self.reachability.lock().unwrap().clone()
    }
}

impl Adapter for RecordingAdapter {
    fn binding(&self) -> &AdapterBinding {
        &self.binding
    }

    fn on_status(&self, status: Option<&ComponentStatus>) {
        self.statuses.lock().unwrap().push(status.cloned());
    }

    fn process_event(&self, event: &DeviceEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn set_reachable(&self, reachable: bool) {
        self.reachability.lock().unwrap().push(reachable);
    }
}

/// Builds [`RecordingAdapter`]s and keeps a handle on each one.
#[derive(Default)]
pub(crate) struct RecordingFactory {
    pub built: Mutex<Vec<std::sync::Arc<RecordingAdapter>>>,
}

impl RecordingFactory {
    pub fn adapter(&self, index: usize) -> std::sync::Arc<RecordingAdapter> {
        std::sync::Arc::clone(&self.built.lock().unwrap()[index])
    }
}

impl<G> crate::ports::AdapterFactory<G> for RecordingFactory {
    fn build(&self, context: crate::ports::AdapterContext<G>) -> std::sync::Arc<dyn Adapter> {
        let adapter = std::sync::Arc::new(RecordingAdapter::new(context.binding));
        self.built.lock().unwrap().push(std::sync::Arc::clone(&adapter));
        adapter
    }
}
