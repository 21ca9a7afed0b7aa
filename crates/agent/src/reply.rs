//! Parsing and validation of the model's turn reply.

use serde_json::{Map, Value};
use thiserror::Error;

/// One validated completion, in the shape the turn contract requires.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelReply {
    pub response_text: String,
    pub extracted_data: Map<String, Value>,
    pub is_complete: bool,
}

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("model reply is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("model reply violates the output contract: {0}")]
    ContractViolation(String),
}

/// Parses one completion into the turn contract.
///
/// Models wrap JSON in Markdown code fences often enough, despite the
/// instruction not to, that a fenced wrapper is stripped before parsing.
/// All three contract keys must be present with the right types; extra keys
/// are ignored.
pub fn parse_model_reply(raw: &str) -> Result<ModelReply, ReplyError> {
    let stripped = strip_code_fences(raw);
    let value: Value = serde_json::from_str(&stripped)
        .map_err(|error| ReplyError::MalformedJson(error.to_string()))?;
    let Value::Object(object) = value else {
        return Err(contract("reply is not a JSON object"));
    };

    let response_text = match object.get("responseText") {
        Some(Value::String(text)) => text.clone(),
        Some(_) => return Err(contract("`responseText` must be a string")),
        None => return Err(contract("`responseText` is missing")),
    };
    let extracted_data = match object.get("extractedData") {
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(contract("`extractedData` must be an object")),
        None => return Err(contract("`extractedData` is missing")),
    };
    let is_complete = match object.get("isComplete") {
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(contract("`isComplete` must be a boolean")),
        None => return Err(contract("`isComplete` is missing")),
    };

    Ok(ModelReply { response_text, extracted_data, is_complete })
}

fn contract(detail: &str) -> ReplyError {
    ReplyError::ContractViolation(detail.to_string())
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return trimmed.to_string();
    }

    // Skip the opening fence line (which may carry a language tag) and drop
    // the closing fence.
    let start = match trimmed.find('\n') {
        Some(position) => position + 1,
        None => 3,
    };
    let end = trimmed.rfind("\n```").unwrap_or(trimmed.len() - 3);
    if start >= end {
        return trimmed.to_string();
    }
    trimmed[start..end].trim().to_string()
}
