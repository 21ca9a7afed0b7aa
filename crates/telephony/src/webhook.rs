//! Form payloads the telephony provider posts to the voice webhook.

use serde::Deserialize;

/// One turn of a call, as posted by the provider after each gather.
///
/// The provider uses PascalCase form keys and sends many more fields than we
/// read; everything beyond these three is ignored on deserialization.
#[derive(Clone, Debug, Deserialize)]
pub struct TurnRequest {
    /// Provider-assigned call identifier, stable for the life of the call.
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    /// Transcribed caller speech. Absent on the first turn and when the
    /// gather timed out without hearing anything.
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    /// Number the call was placed to, i.e. the callee.
    #[serde(rename = "To", default)]
    pub to: String,
}

impl TurnRequest {
    /// The caller's utterance with surrounding whitespace removed, or `None`
    /// when the transcript is missing or blank. Silence and a missing field
    /// are treated the same.
    pub fn utterance(&self) -> Option<&str> {
        let text = self.speech_result.as_deref()?.trim();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
