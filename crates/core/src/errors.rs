use thiserror::Error;

use crate::domain::call::CallPhase;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid call phase transition from {from:?} to {to:?}")]
    InvalidPhaseTransition { from: CallPhase, to: CallPhase },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use crate::domain::call::CallPhase;
    use crate::errors::DomainError;

    #[test]
    fn phase_transition_error_names_both_ends() {
        let error = DomainError::InvalidPhaseTransition {
            from: CallPhase::Terminated,
            to: CallPhase::Gathering,
        };

        let rendered = error.to_string();
        assert!(rendered.contains("Terminated"));
        assert!(rendered.contains("Gathering"));
    }
}
