//! Outbound call placement against the provider REST API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use carecall_core::config::TelephonyConfig;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

const CREATE_CALL_TIMEOUT: Duration = Duration::from_secs(15);
const REJECTION_BODY_LIMIT: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceCallRequest {
    /// E.164 number to dial.
    pub to: String,
    /// Absolute URL the provider should post each turn of the call to.
    pub webhook_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedCall {
    pub call_sid: String,
}

#[derive(Debug, Error)]
pub enum CallPlacementError {
    #[error("call placement request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider rejected call placement with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("provider returned a malformed call resource: {0}")]
    MalformedResponse(String),
}

/// Places outbound calls.
///
/// The server keeps this behind a trait so call initiation can be exercised
/// without dialing anything; [`NoopCallPlacer`] stands in during tests.
#[async_trait]
pub trait CallPlacer: Send + Sync {
    async fn place_call(&self, request: PlaceCallRequest)
        -> Result<PlacedCall, CallPlacementError>;
}

pub struct TwilioCallPlacer {
    client: reqwest::Client,
    account_sid: String,
    auth_token: SecretString,
    from_number: String,
    api_base_url: String,
}

impl TwilioCallPlacer {
    pub fn from_config(config: &TelephonyConfig) -> Result<Self, CallPlacementError> {
        let client = reqwest::Client::builder().timeout(CREATE_CALL_TIMEOUT).build()?;
        Ok(Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            api_base_url: config.api_base_url.clone(),
        })
    }
}

#[async_trait]
impl CallPlacer for TwilioCallPlacer {
    async fn place_call(
        &self,
        request: PlaceCallRequest,
    ) -> Result<PlacedCall, CallPlacementError> {
        let url = create_call_url(&self.api_base_url, &self.account_sid);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&[
                ("To", request.to.as_str()),
                ("From", self.from_number.as_str()),
                ("Url", request.webhook_url.as_str()),
                ("Method", "POST"),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CallPlacementError::Rejected {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let call_sid = call_sid_from_body(&body)?;
        info!(
            event_name = "telephony.call_placed",
            call_sid = %call_sid,
            to = %request.to,
            "outbound call created"
        );
        Ok(PlacedCall { call_sid })
    }
}

fn create_call_url(api_base_url: &str, account_sid: &str) -> String {
    format!("{}/2010-04-01/Accounts/{}/Calls.json", api_base_url.trim_end_matches('/'), account_sid)
}

fn call_sid_from_body(body: &str) -> Result<String, CallPlacementError> {
    let payload: Value = serde_json::from_str(body).map_err(|error| {
        CallPlacementError::MalformedResponse(format!("call resource is not JSON: {error}"))
    })?;
    match payload.get("sid").and_then(Value::as_str) {
        Some(sid) if !sid.is_empty() => Ok(sid.to_string()),
        _ => Err(CallPlacementError::MalformedResponse(
            "call resource is missing a `sid`".to_string(),
        )),
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= REJECTION_BODY_LIMIT {
        return body.to_string();
    }
    let cut = body
        .char_indices()
        .take_while(|(index, _)| *index <= REJECTION_BODY_LIMIT)
        .last()
        .map(|(index, _)| index)
        .unwrap_or(0);
    format!("{}…", &body[..cut])
}

/// Call placer that dials nothing and hands out sequential synthetic sids.
#[derive(Default)]
pub struct NoopCallPlacer {
    placed: AtomicU64,
}

impl NoopCallPlacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn placed_calls(&self) -> u64 {
        self.placed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallPlacer for NoopCallPlacer {
    async fn place_call(
        &self,
        request: PlaceCallRequest,
    ) -> Result<PlacedCall, CallPlacementError> {
        let sequence = self.placed.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            event_name = "telephony.call_placed",
            to = %request.to,
            webhook_url = %request.webhook_url,
            "noop placer accepted call without dialing"
        );
        Ok(PlacedCall { call_sid: format!("CA-noop-{sequence:08}") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_call_url_tolerates_trailing_slash() {
        let canonical = create_call_url("https://api.twilio.com", "AC123");
        let slashed = create_call_url("https://api.twilio.com/", "AC123");

        assert_eq!(canonical, "https://api.twilio.com/2010-04-01/Accounts/AC123/Calls.json");
        assert_eq!(canonical, slashed);
    }

    #[test]
    fn call_sid_is_read_from_the_call_resource() {
        let sid = call_sid_from_body(r#"{"sid": "CA9f2e", "status": "queued"}"#)
            .expect("well-formed resource parses");
        assert_eq!(sid, "CA9f2e");
    }

    #[test]
    fn missing_or_empty_sid_is_malformed() {
        let missing = call_sid_from_body(r#"{"status": "queued"}"#);
        assert!(matches!(missing, Err(CallPlacementError::MalformedResponse(_))));

        let empty = call_sid_from_body(r#"{"sid": ""}"#);
        assert!(matches!(empty, Err(CallPlacementError::MalformedResponse(_))));

        let not_json = call_sid_from_body("<html>upstream error</html>");
        assert!(matches!(not_json, Err(CallPlacementError::MalformedResponse(_))));
    }

    #[test]
    fn rejection_bodies_are_truncated_for_errors() {
        let body = "x".repeat(2_000);
        let truncated = truncate_body(&body);
        assert!(truncated.len() < body.len());
        assert!(truncated.ends_with('…'));

        assert_eq!(truncate_body("short"), "short");
    }

    #[tokio::test]
    async fn noop_placer_hands_out_sequential_sids() {
        let placer = NoopCallPlacer::new();

        let first = placer
            .place_call(PlaceCallRequest {
                to: "+15551230001".to_string(),
                webhook_url: "https://calls.example.com/voice".to_string(),
            })
            .await
            .expect("noop placement succeeds");
        let second = placer
            .place_call(PlaceCallRequest {
                to: "+15551230002".to_string(),
                webhook_url: "https://calls.example.com/voice".to_string(),
            })
            .await
            .expect("noop placement succeeds");

        assert_eq!(first.call_sid, "CA-noop-00000001");
        assert_eq!(second.call_sid, "CA-noop-00000002");
        assert_eq!(placer.placed_calls(), 2);
    }
}
