use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::PlatformError;

/// Endpoints and OAuth client registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Base URL of the REST API, without trailing slash.
    pub api_url: String,
    /// Base URL of the OAuth server (`/oauth/authorize`, `/oauth/token`).
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Where the authorization server sends the user back with a code.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.smartthings.com/v1".to_string(),
            auth_url: "https://auth-global.api.smartthings.com".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://127.0.0.1:8080/oauth/callback".to_string(),
            scopes: vec![
                "r:locations:*".to_string(),
                "r:devices:*".to_string(),
                "x:devices:*".to_string(),
            ],
            timeout_secs: 30,
        }
    }
}

impl PlatformConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The URL a user opens to grant the bridge access.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::InvalidUrl`] when `auth_url` is not a valid
    /// base URL.
    pub fn authorize_url(&self) -> Result<Url, PlatformError> {
        let scope = self.scopes.join(" ");
        Url::parse_with_params(
            &format!("{}/oauth/authorize", self.auth_url.trim_end_matches('/')),
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
            ],
        )
        .map_err(|err| PlatformError::InvalidUrl {
            url: self.auth_url.clone(),
            reason: err.to_string(),
        })
    }

    pub(crate) fn api(&self, path: &str) -> String {
        format!("{}{path}", self.api_url.trim_end_matches('/'))
    }

    /// Whether `url` points inside the API base, so it may carry the
    /// bearer token.
    pub(crate) fn is_api_url(&self, url: &str) -> bool {
        let base = self.api_url.trim_end_matches('/');
        url.strip_prefix(base)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', '?']))
    }

    pub(crate) fn token_endpoint(&self) -> String {
        format!("{}/oauth/token", self.auth_url.trim_end_matches('/'))
    }
}
