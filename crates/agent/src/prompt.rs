//! Completion request assembly.
//!
//! Every turn sends the same sandwich: the fixed intake script and output
//! contract first, the full transcript in the middle, and a trailing reminder
//! carrying the collected-data snapshot so the model never has to re-derive
//! progress from the transcript alone.

use std::fmt::Write;

use serde_json::{Map, Value};

use carecall_core::{IntakeField, TurnMessage};

/// Fixed instruction that opens every completion request.
pub fn system_instruction() -> String {
    let mut script = String::new();
    for (position, field) in IntakeField::ALL.iter().enumerate() {
        let _ = writeln!(script, "{}. {} (key: {})", position + 1, field.label(), field.key());
    }

    format!(
        "You are Cara, a friendly intake assistant calling on behalf of a health clinic. \
         You are speaking with a patient over the phone, so keep every reply short, warm, \
         and easy to follow by ear.\n\
         Work through this script one question at a time, in order:\n\
         {script}\
         Introduce yourself on the first turn, then ask for the first missing detail. \
         Acknowledge each answer briefly before moving on, and politely re-ask anything \
         unclear.\n\
         Reply with a single JSON object and nothing else: no surrounding prose, no code \
         fences. The object must have exactly these keys:\n\
         \"responseText\" (string): the next sentence to speak to the patient.\n\
         \"extractedData\" (object): script keys mapped to any values heard this turn.\n\
         \"isComplete\" (boolean): true only once every field is collected and you have \
         said goodbye.\n\
         When isComplete is true, responseText must be your closing thank-you and goodbye."
    )
}

/// Trailing reminder appended after the transcript.
pub fn progress_reminder(collected: &Map<String, Value>) -> String {
    let snapshot = if collected.is_empty() {
        "nothing yet".to_string()
    } else {
        Value::Object(collected.clone()).to_string()
    };
    format!(
        "Collected so far: {snapshot}. Ask for the next missing scripted field, or wrap up \
         if everything is collected. Respond with the JSON object only."
    )
}

/// The full ordered message list for one completion call.
pub fn completion_messages(
    history: &[TurnMessage],
    collected: &Map<String, Value>,
) -> Vec<TurnMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(TurnMessage::system(system_instruction()));
    messages.extend_from_slice(history);
    messages.push(TurnMessage::system(progress_reminder(collected)));
    messages
}
