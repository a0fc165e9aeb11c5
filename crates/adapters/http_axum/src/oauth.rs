//! OAuth redirect target.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use capbridge_app::ports::{AuthorizationHandler, EventSink};

use crate::error::HttpError;
use crate::state::AppState;

/// Query string sent by the authorization server.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Possible responses from the callback endpoint.
pub enum CallbackResponse {
    Authorized,
}

impl IntoResponse for CallbackResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Authorized => "Authorization complete, you can close this page.".into_response(),
        }
    }
}

/// `GET /oauth/callback?code=…`
///
/// # Errors
///
/// Answers 400 when no code is present and 502 when the token endpoint
/// rejects the exchange.
#[tracing::instrument(skip_all)]
pub async fn callback<A, E>(
    State(state): State<AppState<A, E>>,
    Query(query): Query<CallbackQuery>,
) -> Result<CallbackResponse, HttpError>
where
    A: AuthorizationHandler + 'static,
    E: EventSink + 'static,
{
    if let Some(reason) = query.error {
        tracing::warn!(%reason, "authorization denied by the user");
    }
    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or(HttpError::BadRequest("missing authorization code"))?;
    state.authorization.complete_authorization(&code).await?;
    tracing::info!("authorization completed");
    Ok(CallbackResponse::Authorized)
}
