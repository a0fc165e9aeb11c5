//! Authorized gateway: per-device calls carrying the current access token.

use std::sync::Arc;

use capbridge_domain::command::Command;
use capbridge_domain::error::ApiError;
use capbridge_domain::id::DeviceId;
use capbridge_domain::status::HealthState;

use crate::ports::platform::ComponentStatuses;
use crate::ports::{DeviceGateway, PlatformApi, Reauthenticator, TokenRepository};
use crate::services::token_store::TokenStore;

/// [`DeviceGateway`] backed by a [`PlatformApi`] and the shared
/// [`TokenStore`]. A rejected token is refreshed and the call retried once.
pub struct AuthorizedGateway<P, R, N> {
    store: Arc<TokenStore<P, R, N>>,
}

impl<P, R, N> AuthorizedGateway<P, R, N> {
    #[must_use]
    pub fn new(store: Arc<TokenStore<P, R, N>>) -> Self {
        Self { store }
    }
}

impl<P, R, N> Clone for AuthorizedGateway<P, R, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<P, R, N> DeviceGateway for AuthorizedGateway<P, R, N>
where
    P: PlatformApi,
    R: TokenRepository,
    N: Reauthenticator,
{
    async fn fetch_status(&self, device_id: DeviceId) -> Result<ComponentStatuses, ApiError> {
        let api = self.store.api();
        self.store
            .with_access_token(|token| async move { api.device_status(&token, device_id).await })
            .await
    }

    async fn fetch_health(&self, device_id: DeviceId) -> Result<HealthState, ApiError> {
        let api = self.store.api();
        self.store
            .with_access_token(|token| async move { api.device_health(&token, device_id).await })
            .await
    }

    async fn post_commands(&self, device_id: DeviceId, commands: &[Command]) -> Result<(), ApiError> {
        let api = self.store.api();
        self.store
            .with_access_token(|token| async move {
                api.send_commands(&token, device_id, commands).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use capbridge_domain::time;
    use capbridge_domain::token::TokenRecord;

    use super::*;
    use crate::services::token_store::TokenPolicy;
    use crate::testing::{FakePlatform, InMemoryTokenRepo, RecordingReauth, cap};

    async fn gateway(
        access: &str,
    ) -> (
        AuthorizedGateway<Arc<FakePlatform>, InMemoryTokenRepo, Arc<RecordingReauth>>,
        Arc<FakePlatform>,
        Arc<RecordingReauth>,
    ) {
        let now = time::now();
        let record = TokenRecord {
            access_token: access.to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: now + TimeDelta::hours(12),
            refresh_token_expires_at: now + TimeDelta::days(30),
        };
        let api = Arc::new(FakePlatform::default());
        let reauth = Arc::new(RecordingReauth::default());
        let store = TokenStore::initialize(
            Arc::clone(&api),
            InMemoryTokenRepo::with(record),
            Arc::clone(&reauth),
            TokenPolicy::default(),
            None,
        )
        .await
        .unwrap();
        (AuthorizedGateway::new(Arc::new(store)), api, reauth)
    }

    #[tokio::test]
    async fn should_attach_current_token_to_device_calls() {
        let (gateway, api, _) = gateway("access-1").await;

        gateway.fetch_status(DeviceId::new()).await.unwrap();
        gateway.fetch_health(DeviceId::new()).await.unwrap();
        gateway
            .post_commands(DeviceId::new(), &[Command::new(cap("switch"), "on")])
            .await
            .unwrap();

        assert_eq!(api.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn should_recover_from_rejected_token_transparently() {
        let (gateway, api, reauth) = gateway("expired-upstream").await;

        let health = gateway.fetch_health(DeviceId::new()).await.unwrap();

        assert!(health.is_online());
        assert_eq!(api.refresh_calls(), 1);
        assert!(reauth.reasons().is_empty());
    }
}
