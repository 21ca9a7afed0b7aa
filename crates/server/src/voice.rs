//! Voice webhook routes driving the intake conversation.
//!
//! Endpoints:
//! - `POST /voice` - one turn of the call: transcribed speech in, TwiML out
//!
//! The provider resolves relative TwiML URLs against the webhook it just
//! posted to, so gather actions and silence redirects point back at
//! [`VOICE_PATH`] and the loop continues until the controller hangs up.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Form, Router};
use carecall_agent::{TurnController, TurnDirective};
use carecall_core::CallId;
use carecall_telephony::{twiml, TurnRequest};
use tracing::info;

pub const VOICE_PATH: &str = "/voice";

#[derive(Clone)]
pub struct VoiceState {
    controller: Arc<TurnController>,
    apology_line: String,
}

pub fn router(controller: Arc<TurnController>, apology_line: String) -> Router {
    Router::new()
        .route(VOICE_PATH, post(voice_turn))
        .with_state(VoiceState { controller, apology_line })
}

type TwimlResponse = (StatusCode, [(&'static str, &'static str); 1], String);

fn twiml_ok(document: String) -> TwimlResponse {
    (StatusCode::OK, [("Content-Type", "application/xml")], document)
}

/// One turn of the conversation. Always answers 200 with a TwiML document;
/// processing failures degrade to the configured apology plus hangup while
/// the controller keeps the entry for a transport retry.
pub async fn voice_turn(
    State(state): State<VoiceState>,
    Form(turn): Form<TurnRequest>,
) -> TwimlResponse {
    let call_id = CallId(turn.call_sid.clone());
    info!(
        event_name = "voice.turn_received",
        call_id = %call_id,
        heard_speech = turn.utterance().is_some(),
        "turn webhook received"
    );

    match state.controller.handle_turn(&call_id, turn.utterance(), &turn.to).await {
        Ok(TurnDirective::GatherNext { prompt }) => twiml_ok(twiml::gather_turn(&prompt, VOICE_PATH)),
        Ok(TurnDirective::Complete { farewell, persisted }) => {
            info!(
                event_name = "voice.call_completed",
                call_id = %call_id,
                persisted,
                "intake call completed"
            );
            twiml_ok(twiml::farewell(&farewell))
        }
        // already logged by the controller, entry retained there
        Err(_) => twiml_ok(twiml::farewell(&state.apology_line)),
    }
}
