//! Re-authentication port: the full authorization flow entry point.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Why the bridge needs the user to authorize it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReauthReason {
    /// No token record exists at all.
    MissingCredentials,
    /// The refresh token is past its lifetime.
    RefreshTokenExpired,
    /// The token endpoint rejected a refresh.
    RefreshFailed,
    /// A crash loop wiped the credential.
    CrashLoop,
}

impl fmt::Display for ReauthReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingCredentials => "no stored credentials",
            Self::RefreshTokenExpired => "refresh token expired",
            Self::RefreshFailed => "token refresh was rejected",
            Self::CrashLoop => "repeated startup failures",
        })
    }
}

/// Starts the out-of-band authorization flow (e.g. prints the URL the user
/// must visit; the resulting code arrives through the inbound callback).
pub trait Reauthenticator: Send + Sync {
    fn request_reauthorization(&self, reason: ReauthReason)
    -> impl Future<Output = ()> + Send;
}

impl<T: Reauthenticator> Reauthenticator for Arc<T> {
    fn request_reauthorization(
        &self,
        reason: ReauthReason,
    ) -> impl Future<Output = ()> + Send {
        (**self).request_reauthorization(reason)
    }
}
