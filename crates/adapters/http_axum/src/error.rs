//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use capbridge_domain::error::{AuthError, BridgeError};

/// JSON error body returned by every endpoint.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Errors surfaced by the push channel.
#[derive(Debug)]
pub enum HttpError {
    /// The request itself was malformed.
    BadRequest(&'static str),
    /// An application call failed.
    Bridge(BridgeError),
}

impl From<BridgeError> for HttpError {
    fn from(err: BridgeError) -> Self {
        Self::Bridge(err)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(reason) => (StatusCode::BAD_REQUEST, (*reason).to_string()),
            Self::Bridge(BridgeError::Auth(AuthError::ExchangeRejected(source))) => {
                tracing::warn!(error = %source, "authorization code exchange rejected");
                (StatusCode::BAD_GATEWAY, "authorization was rejected".to_string())
            }
            Self::Bridge(BridgeError::Api(source)) => {
                tracing::warn!(error = %source, "platform call failed");
                (StatusCode::BAD_GATEWAY, source.to_string())
            }
            Self::Bridge(BridgeError::Validation(err)) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::Bridge(err) => {
                tracing::error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
