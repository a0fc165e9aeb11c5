//! Platform webhook: lifecycle handshake and device events.
//!
//! The body is a lifecycle envelope. `PING` carries a challenge that must be
//! echoed back; `EVENT` carries a batch of which only `DEVICE_EVENT` entries
//! are routed.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use capbridge_app::ports::{AuthorizationHandler, EventSink};
use capbridge_domain::capability::{Capability, ComponentId};
use capbridge_domain::event::DeviceEvent;
use capbridge_domain::id::DeviceId;

use crate::error::HttpError;
use crate::state::AppState;

/// Incoming lifecycle envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "lifecycle", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookRequest {
    Ping {
        #[serde(rename = "pingData")]
        ping_data: PingData,
    },
    Event {
        #[serde(rename = "eventData")]
        event_data: EventData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingData {
    pub challenge: String,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub events: Vec<EventEnvelope>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: String,
    pub device_event: Option<RawDeviceEvent>,
}

/// Device event as the platform serializes it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeviceEvent {
    pub device_id: String,
    pub component_id: String,
    pub capability: String,
    pub attribute: String,
    #[serde(default)]
    pub value: serde_json::Value,
    pub unit: Option<String>,
}

impl RawDeviceEvent {
    fn into_event(self) -> Option<DeviceEvent> {
        Some(DeviceEvent {
            device_id: self.device_id.parse::<DeviceId>().ok()?,
            component_id: ComponentId::new(self.component_id).ok()?,
            capability: Capability::new(self.capability).ok()?,
            attribute: self.attribute,
            value: self.value,
            unit: self.unit,
        })
    }
}

/// Possible responses from the webhook endpoint.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WebhookResponse {
    Ping {
        #[serde(rename = "pingData")]
        ping_data: PingData,
    },
    Event {
        received: usize,
        routed: usize,
    },
}

impl IntoResponse for WebhookResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `POST /events`
///
/// # Errors
///
/// Never fails once the body is decoded; malformed events are skipped.
#[tracing::instrument(skip_all)]
pub async fn receive<A, E>(
    State(state): State<AppState<A, E>>,
    Json(request): Json<WebhookRequest>,
) -> Result<WebhookResponse, HttpError>
where
    A: AuthorizationHandler + 'static,
    E: EventSink + 'static,
{
    match request {
        WebhookRequest::Ping { ping_data } => {
            tracing::debug!("webhook verification ping");
            Ok(WebhookResponse::Ping { ping_data })
        }
        WebhookRequest::Event { event_data } => {
            let received = event_data.events.len();
            let routed = event_data
                .events
                .into_iter()
                .filter(|envelope| envelope.event_type == "DEVICE_EVENT")
                .filter_map(|envelope| envelope.device_event)
                .filter_map(|raw| {
                    let event = raw.into_event();
                    if event.is_none() {
                        tracing::warn!("skipping malformed device event");
                    }
                    event
                })
                .filter(|event| state.events.dispatch(event))
                .count();
            tracing::debug!(received, routed, "webhook events processed");
            Ok(WebhookResponse::Event { received, routed })
        }
    }
}
