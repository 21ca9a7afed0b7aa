//! Telephony integration - voice webhook plumbing for carecall
//!
//! This crate owns everything that speaks the telephony provider's dialect:
//! - **TwiML** (`twiml`) - builders for the XML verbs returned to the provider
//! - **Webhook** (`webhook`) - form payloads the provider posts on each turn
//! - **REST** (`rest`) - outbound call placement against the provider API
//!
//! The agent runtime never sees raw XML or form encodings; it trades in
//! [`webhook::TurnRequest`] on the way in and plain prompt strings on the way
//! out, and the server layer wraps those strings with [`twiml`] here.

pub mod rest;
pub mod twiml;
pub mod webhook;

pub use rest::{
    CallPlacementError, CallPlacer, NoopCallPlacer, PlaceCallRequest, PlacedCall, TwilioCallPlacer,
};
pub use twiml::VoiceResponse;
pub use webhook::TurnRequest;
