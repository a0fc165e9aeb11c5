//! Re-authorization prompt for a headless daemon.

use capbridge_app::ports::{ReauthReason, Reauthenticator};

/// Logs the authorization URL; the code comes back through
/// `/oauth/callback`.
pub struct LogReauthenticator {
    authorize_url: String,
}

impl LogReauthenticator {
    pub fn new(authorize_url: impl Into<String>) -> Self {
        Self {
            authorize_url: authorize_url.into(),
        }
    }
}

impl Reauthenticator for LogReauthenticator {
    async fn request_reauthorization(&self, reason: ReauthReason) {
        tracing::warn!(
            %reason,
            url = %self.authorize_url,
            "authorization required, open the url in a browser to grant access"
        );
    }
}
