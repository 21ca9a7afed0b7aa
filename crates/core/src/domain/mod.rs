pub mod call;
pub mod intake;

pub use call::{CallId, CallPhase, MessageRole, TurnMessage};
pub use intake::{IntakeField, IntakeRecord};
