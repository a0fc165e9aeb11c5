use serde::de::DeserializeOwned;

use capbridge_app::ports::PlatformApi;
use capbridge_app::ports::platform::ComponentStatuses;
use capbridge_domain::command::Command;
use capbridge_domain::device::{Device, Location};
use capbridge_domain::error::ApiError;
use capbridge_domain::id::DeviceId;
use capbridge_domain::status::HealthState;
use capbridge_domain::token::TokenGrant;

use crate::config::PlatformConfig;
use crate::dto::{CommandsRequest, DeviceDto, HealthDto, LocationDto, Page, StatusDto};
use crate::error::{PlatformError, status, transport};

/// Upper bound on followed `next` links, against a server that loops.
const MAX_PAGES: usize = 100;

/// [`PlatformApi`] over the platform's public REST API.
///
/// Holds no credential state; every device call receives the access token
/// from the caller.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    http: reqwest::Client,
    config: PlatformConfig,
}

impl PlatformClient {
    /// # Errors
    ///
    /// Returns [`PlatformError::Client`] when the TLS backend cannot be
    /// initialized.
    pub fn new(config: PlatformConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("capbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(PlatformError::Client)?;
        Ok(Self { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let code = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = code.as_u16(), %body, "platform rejected request");
        Err(status(code, body))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, access_token: &str) -> Result<T, ApiError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|err| transport(&err))?;
        Self::check(response)
            .await?
            .json::<T>()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn get_all<T: DeserializeOwned>(&self, path: &str, access_token: &str) -> Result<Vec<T>, ApiError> {
        let mut url = self.config.api(path);
        let mut items = Vec::new();
        for _ in 0..MAX_PAGES {
            let page: Page<T> = self.get_json(&url, access_token).await?;
            let next = page.next().map(ToString::to_string);
            items.extend(page.items);
            match next {
                Some(href) if self.config.is_api_url(&href) => url = href,
                Some(href) => {
                    tracing::warn!(path, %href, "pagination link leaves the API, not followed");
                    return Err(ApiError::Decode(format!(
                        "next page link outside the API base: {href}"
                    )));
                }
                None => return Ok(items),
            }
        }
        tracing::warn!(path, "pagination limit reached, listing truncated");
        Ok(items)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, ApiError> {
        let response = self
            .http
            .post(self.config.token_endpoint())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|err| transport(&err))?;
        // The token endpoint answers 401 for a bad client or refresh token;
        // that is a rejected exchange, not a stale access token.
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Rejected { status: 401, body });
        }
        Self::check(response)
            .await?
            .json::<TokenGrant>()
            .await
            .map_err(|err| ApiError::Decode(err.to_string()))
    }
}

impl PlatformApi for PlatformClient {
    #[tracing::instrument(skip_all)]
    async fn list_locations(&self, access_token: &str) -> Result<Vec<Location>, ApiError> {
        let dtos: Vec<LocationDto> = self.get_all("/locations", access_token).await?;
        Ok(dtos.into_iter().filter_map(LocationDto::into_location).collect())
    }

    #[tracing::instrument(skip_all)]
    async fn list_devices(&self, access_token: &str) -> Result<Vec<Device>, ApiError> {
        let dtos: Vec<DeviceDto> = self.get_all("/devices", access_token).await?;
        let total = dtos.len();
        let devices: Vec<Device> = dtos.into_iter().filter_map(DeviceDto::into_device).collect();
        if devices.len() < total {
            tracing::warn!(skipped = total - devices.len(), "ignoring malformed devices");
        }
        Ok(devices)
    }

    #[tracing::instrument(skip(self, access_token))]
    async fn device_status(
        &self,
        access_token: &str,
        device_id: DeviceId,
    ) -> Result<ComponentStatuses, ApiError> {
        let url = self.config.api(&format!("/devices/{device_id}/status"));
        let dto: StatusDto = self.get_json(&url, access_token).await?;
        Ok(dto.components)
    }

    #[tracing::instrument(skip(self, access_token))]
    async fn device_health(&self, access_token: &str, device_id: DeviceId) -> Result<HealthState, ApiError> {
        let url = self.config.api(&format!("/devices/{device_id}/health"));
        let dto: HealthDto = self.get_json(&url, access_token).await?;
        Ok(dto.state)
    }

    #[tracing::instrument(skip(self, access_token, commands), fields(count = commands.len()))]
    async fn send_commands(
        &self,
        access_token: &str,
        device_id: DeviceId,
        commands: &[Command],
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .post(self.config.api(&format!("/devices/{device_id}/commands")))
            .bearer_auth(access_token)
            .json(&CommandsRequest { commands })
            .send()
            .await
            .map_err(|err| transport(&err))?;
        Self::check(response).await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn exchange_authorization_code(&self, code: &str) -> Result<TokenGrant, ApiError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    #[tracing::instrument(skip_all)]
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ])
        .await
    }
}
