//! Call initiation API for starting outbound intake calls.
//!
//! Endpoints:
//! - `POST /calls` - dial a number and point the resulting call at
//!   `{callbackBaseUrl}/voice`

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use carecall_telephony::{CallPlacer, PlaceCallRequest};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::voice::VOICE_PATH;

#[derive(Clone)]
pub struct CallsState {
    call_placer: Arc<dyn CallPlacer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallRequest {
    #[serde(default)]
    pub phone_number: String,
    /// Public base URL of this server, as reachable by the provider.
    #[serde(default)]
    pub callback_base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallResponse {
    pub message: String,
    pub call_sid: String,
}

#[derive(Debug, Serialize)]
pub struct InitiationError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router(call_placer: Arc<dyn CallPlacer>) -> Router {
    Router::new().route("/calls", post(initiate_call)).with_state(CallsState { call_placer })
}

pub async fn initiate_call(
    State(state): State<CallsState>,
    Json(body): Json<InitiateCallRequest>,
) -> Result<Json<InitiateCallResponse>, (StatusCode, Json<InitiationError>)> {
    let phone_number = body.phone_number.trim();
    let callback_base_url = body.callback_base_url.trim();
    if phone_number.is_empty() || callback_base_url.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(InitiationError {
                message: "phoneNumber and callbackBaseUrl are required".to_string(),
                error: None,
            }),
        ));
    }

    let webhook_url = format!("{}{VOICE_PATH}", callback_base_url.trim_end_matches('/'));
    let request = PlaceCallRequest { to: phone_number.to_string(), webhook_url };

    match state.call_placer.place_call(request).await {
        Ok(placed) => {
            info!(
                event_name = "calls.initiated",
                call_sid = %placed.call_sid,
                to = %phone_number,
                "outbound intake call placed"
            );
            Ok(Json(InitiateCallResponse {
                message: "Call initiated".to_string(),
                call_sid: placed.call_sid,
            }))
        }
        Err(placement_error) => {
            error!(
                event_name = "calls.initiation_failed",
                to = %phone_number,
                error = %placement_error,
                "outbound call placement failed"
            );
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(InitiationError {
                    message: "Failed to initiate call".to_string(),
                    error: Some(placement_error.to_string()),
                }),
            ))
        }
    }
}
