//! Platform ports: the remote device platform and its authorized view.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use capbridge_domain::capability::ComponentId;
use capbridge_domain::command::Command;
use capbridge_domain::device::{Device, Location};
use capbridge_domain::error::ApiError;
use capbridge_domain::id::DeviceId;
use capbridge_domain::status::{ComponentStatus, HealthState};
use capbridge_domain::token::TokenGrant;

/// Status trees keyed by component, as returned by one status call.
pub type ComponentStatuses = BTreeMap<ComponentId, ComponentStatus>;

/// The remote device platform.
///
/// Every device call takes the access token explicitly: the adapter owns no
/// credential state, the [`TokenStore`](crate::services::token_store::TokenStore)
/// does.
pub trait PlatformApi: Send + Sync {
    /// `GET /locations`
    fn list_locations(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<Vec<Location>, ApiError>> + Send;

    /// `GET /devices`
    fn list_devices(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<Vec<Device>, ApiError>> + Send;

    /// `GET /devices/{id}/status`
    fn device_status(
        &self,
        access_token: &str,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<ComponentStatuses, ApiError>> + Send;

    /// `GET /devices/{id}/health`
    fn device_health(
        &self,
        access_token: &str,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<HealthState, ApiError>> + Send;

    /// `POST /devices/{id}/commands` with the whole batch.
    fn send_commands(
        &self,
        access_token: &str,
        device_id: DeviceId,
        commands: &[Command],
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /oauth/token` with the authorization-code grant.
    fn exchange_authorization_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<TokenGrant, ApiError>> + Send;

    /// `POST /oauth/token` with the refresh-token grant.
    fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenGrant, ApiError>> + Send;
}

impl<T: PlatformApi> PlatformApi for Arc<T> {
    fn list_locations(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<Vec<Location>, ApiError>> + Send {
        (**self).list_locations(access_token)
    }

    fn list_devices(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<Vec<Device>, ApiError>> + Send {
        (**self).list_devices(access_token)
    }

    fn device_status(
        &self,
        access_token: &str,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<ComponentStatuses, ApiError>> + Send {
        (**self).device_status(access_token, device_id)
    }

    fn device_health(
        &self,
        access_token: &str,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<HealthState, ApiError>> + Send {
        (**self).device_health(access_token, device_id)
    }

    fn send_commands(
        &self,
        access_token: &str,
        device_id: DeviceId,
        commands: &[Command],
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).send_commands(access_token, device_id, commands)
    }

    fn exchange_authorization_code(
        &self,
        code: &str,
    ) -> impl Future<Output = Result<TokenGrant, ApiError>> + Send {
        (**self).exchange_authorization_code(code)
    }

    fn exchange_refresh_token(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenGrant, ApiError>> + Send {
        (**self).exchange_refresh_token(refresh_token)
    }
}

/// Per-device remote calls, already authorized.
///
/// This is what a [`DeviceSynchronizer`](crate::services::device_synchronizer::DeviceSynchronizer)
/// talks to. The production implementation is
/// [`AuthorizedGateway`](crate::services::authorized_gateway::AuthorizedGateway),
/// which attaches the current access token and handles a rejected token once.
pub trait DeviceGateway: Send + Sync {
    fn fetch_status(
        &self,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<ComponentStatuses, ApiError>> + Send;

    fn fetch_health(
        &self,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<HealthState, ApiError>> + Send;

    fn post_commands(
        &self,
        device_id: DeviceId,
        commands: &[Command],
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl<T: DeviceGateway> DeviceGateway for Arc<T> {
    fn fetch_status(
        &self,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<ComponentStatuses, ApiError>> + Send {
        (**self).fetch_status(device_id)
    }

    fn fetch_health(
        &self,
        device_id: DeviceId,
    ) -> impl Future<Output = Result<HealthState, ApiError>> + Send {
        (**self).fetch_health(device_id)
    }

    fn post_commands(
        &self,
        device_id: DeviceId,
        commands: &[Command],
    ) -> impl Future<Output = Result<(), ApiError>> + Send {
        (**self).post_commands(device_id, commands)
    }
}
