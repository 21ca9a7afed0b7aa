//! Agent Runtime - per-call conversation state and turn orchestration
//!
//! This crate is the "brain" of carecall - everything between the voice
//! webhook and the database:
//! - Tracks in-flight calls in a keyed store (`conversation`)
//! - Assembles the completion request for each turn (`prompt`)
//! - Parses and validates the model's JSON reply (`reply`)
//! - Talks to the completion service with timeout and retry (`llm`)
//! - Runs the turn contract end to end (`runtime`)
//!
//! # Architecture
//!
//! Each webhook delivery becomes one `TurnController::handle_turn` call:
//! 1. **Fetch state** - get-or-create the call's entry, take its per-call lock
//! 2. **Append input** - caller utterance joins the history (when non-empty)
//! 3. **Complete** - script + history + progress reminder go to the model
//! 4. **Validate** - the reply must be the exact three-key JSON contract
//! 5. **Merge + branch** - extracted fields merge in; either gather the next
//!    utterance or persist the intake record and end the call
//!
//! # Safety Principle
//!
//! The model decides only what to *say* and which fields it *heard*. Whether
//! data is stored, when the call ends on error, and what reaches the database
//! are all decided here, deterministically.

pub mod conversation;
pub mod llm;
pub mod prompt;
pub mod reply;
pub mod runtime;

pub use conversation::{ConversationState, ConversationStore};
pub use llm::{ChatCompletionsClient, CompletionClient, CompletionError, RetryPolicy};
pub use reply::{ModelReply, ReplyError};
pub use runtime::{TurnController, TurnDirective, TurnError};
