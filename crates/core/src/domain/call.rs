use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Opaque identifier assigned by the telephony provider, unique per phone
/// call. Correlates successive webhook turns of the same conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One entry of a conversation transcript. The transcript is replayed
/// verbatim to the completion service, so insertion order is significant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMessage {
    pub role: MessageRole,
    pub content: String,
}

impl TurnMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// Lifecycle of one tracked call. `Gathering` loops on itself for every
/// non-terminal turn; `Terminated` is the completion-reported exit.
/// `FailedAbort` marks a turn that ended in an apology: the caller was told
/// to hang up but the state is kept, so a transport retry of the webhook can
/// resume gathering from the pre-failure history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    Gathering,
    Terminated,
    FailedAbort,
}

impl CallPhase {
    pub fn can_transition_to(&self, next: CallPhase) -> bool {
        matches!(
            (self, next),
            (CallPhase::Gathering, CallPhase::Gathering)
                | (CallPhase::Gathering, CallPhase::Terminated)
                | (CallPhase::Gathering, CallPhase::FailedAbort)
                | (CallPhase::FailedAbort, CallPhase::Gathering)
        )
    }

    pub fn transition_to(&mut self, next: CallPhase) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            *self = next;
            return Ok(());
        }

        Err(DomainError::InvalidPhaseTransition { from: *self, to: next })
    }
}
