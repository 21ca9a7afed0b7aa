use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The fields the intake script walks through, in elicitation order.
///
/// Every field is collected during the conversation, but only the ones with
/// `is_persisted() == true` have columns in `intake_records`; the rest exist
/// so the script can qualify the caller (age, gender) without storing them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeField {
    FullName,
    Age,
    Gender,
    Address,
    HealthCondition,
}

impl IntakeField {
    pub const ALL: [IntakeField; 5] = [
        IntakeField::FullName,
        IntakeField::Age,
        IntakeField::Gender,
        IntakeField::Address,
        IntakeField::HealthCondition,
    ];

    /// Key used in `extractedData` payloads and `collected_data` maps.
    pub fn key(&self) -> &'static str {
        match self {
            Self::FullName => "full_name",
            Self::Age => "age",
            Self::Gender => "gender",
            Self::Address => "address",
            Self::HealthCondition => "health_condition",
        }
    }

    /// Human wording used when the script asks for the field.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FullName => "full name",
            Self::Age => "age",
            Self::Gender => "gender",
            Self::Address => "home address",
            Self::HealthCondition => "current health condition or concern",
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::FullName | Self::Address | Self::HealthCondition)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntakeRecord {
    pub full_name: Option<String>,
    pub phone_number: String,
    pub address: Option<String>,
    pub health_condition: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IntakeRecord {
    /// Projects the collected conversation fields onto the persisted columns.
    /// Keys without a column (age, gender, anything the model invented) are
    /// dropped here; missing keys become NULL columns.
    pub fn from_collected(phone_number: impl Into<String>, collected: &Map<String, Value>) -> Self {
        Self {
            full_name: text_field(collected, IntakeField::FullName),
            phone_number: phone_number.into(),
            address: text_field(collected, IntakeField::Address),
            health_condition: text_field(collected, IntakeField::HealthCondition),
            created_at: Utc::now(),
        }
    }
}

fn text_field(collected: &Map<String, Value>, field: IntakeField) -> Option<String> {
    collected.get(field.key()).and_then(text_value)
}

// Models occasionally hand back numbers or booleans where a string was asked
// for; render those instead of discarding the turn's work.
fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
