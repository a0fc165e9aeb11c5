use capbridge_domain::error::ApiError;

/// Failures of the HTTP client itself.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build http client")]
    Client(#[source] reqwest::Error),
}

/// Classify a transport-level failure.
pub(crate) fn transport(err: &reqwest::Error) -> ApiError {
    if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

/// Classify a non-success HTTP status.
pub(crate) fn status(status: reqwest::StatusCode, body: String) -> ApiError {
    if status == reqwest::StatusCode::UNAUTHORIZED {
        ApiError::Unauthorized
    } else {
        ApiError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}
