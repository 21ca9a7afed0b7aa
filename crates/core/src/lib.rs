pub mod config;
pub mod domain;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::call::{CallId, CallPhase, MessageRole, TurnMessage};
pub use domain::intake::{IntakeField, IntakeRecord};
pub use errors::DomainError;
