//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`BridgeError`]
//! via `#[from]` or an explicit `From` impl. The leaf types [`ApiError`] and
//! [`AuthError`] are `Clone` so that a single remote outcome can be handed to
//! every caller waiting on the same in-flight request.

use crate::id::DeviceId;

/// Top-level error for every fallible operation in the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A domain invariant was violated.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// Credentials are missing, expired, or were rejected.
    #[error("authentication error")]
    Auth(#[from] AuthError),

    /// A remote platform call failed.
    #[error("remote API error")]
    Api(#[from] ApiError),

    /// The device is marked offline; the call was not sent.
    #[error("device {0} is unreachable")]
    Unreachable(DeviceId),

    /// The remote platform did not accept a command batch.
    #[error("command batch failed for device {device_id}")]
    CommandFailed {
        device_id: DeviceId,
        #[source]
        source: ApiError,
    },

    /// Fetching the device status failed.
    #[error("status fetch failed for device {device_id}")]
    StatusFailed {
        device_id: DeviceId,
        #[source]
        source: ApiError,
    },

    /// Repeated process-level failures were detected.
    #[error("crash loop detected: {count} failures within {window_secs}s")]
    CrashLoopDetected { count: usize, window_secs: u64 },

    /// Persistence layer failure.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Domain validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A component was declared without an identifier.
    #[error("component id must not be empty")]
    EmptyComponentId,

    /// A capability identifier was empty.
    #[error("capability id must not be empty")]
    EmptyCapability,

    /// A device was declared without any component.
    #[error("device must have at least one component")]
    NoComponents,

    /// A token field was empty.
    #[error("token field `{0}` must not be empty")]
    EmptyToken(&'static str),

    /// An adapter was asked to act on a capability it does not own.
    #[error("capability `{0}` is not bound to this adapter")]
    UnboundCapability(String),
}

/// Failures of a remote platform call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The access token was rejected (HTTP 401).
    #[error("request was not authorized")]
    Unauthorized,

    /// Transient connectivity failure (DNS, connect, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The remote answered with a non-success status.
    #[error("remote rejected the request with status {status}")]
    Rejected { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::Unauthorized | Self::Decode(_) => false,
        }
    }
}

/// Failures of the OAuth token lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No token record exists; the user must authorize the bridge.
    #[error("no credentials available, authorization required")]
    MissingCredentials,

    /// The refresh token is past its usable lifetime.
    #[error("refresh token has expired")]
    RefreshTokenExpired,

    /// The token endpoint rejected the exchange.
    #[error("token exchange was rejected")]
    ExchangeRejected(#[source] ApiError),
}
