//! Turn orchestration: one webhook delivery in, one directive out.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use carecall_core::{CallId, CallPhase, DomainError, IntakeRecord, TurnMessage};
use carecall_db::IntakeRepository;

use crate::conversation::{ConversationState, ConversationStore};
use crate::llm::{CompletionClient, CompletionError};
use crate::prompt;
use crate::reply::{parse_model_reply, ReplyError};

/// What the transport should do after a turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnDirective {
    /// Speak the prompt, then gather the next utterance back to the same
    /// endpoint.
    GatherNext { prompt: String },
    /// Speak the farewell, then end the call. `persisted` reports whether the
    /// intake record reached the database; the call ends either way.
    Complete { farewell: String, persisted: bool },
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("completion call failed: {0}")]
    Upstream(#[from] CompletionError),
    #[error(transparent)]
    Reply(#[from] ReplyError),
    #[error("call state error: {0}")]
    State(#[from] DomainError),
}

impl TurnError {
    /// Stable tag for structured logs. The spoken apology does not vary by
    /// kind; the tag is what makes the kinds observable.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "upstream",
            Self::Reply(ReplyError::MalformedJson(_)) => "malformed_reply",
            Self::Reply(ReplyError::ContractViolation(_)) => "contract_violation",
            Self::State(_) => "call_state",
        }
    }
}

/// Orchestrates one webhook turn end to end.
pub struct TurnController {
    store: Arc<ConversationStore>,
    completions: Arc<dyn CompletionClient>,
    intake: Arc<dyn IntakeRepository>,
}

impl TurnController {
    pub fn new(
        store: Arc<ConversationStore>,
        completions: Arc<dyn CompletionClient>,
        intake: Arc<dyn IntakeRepository>,
    ) -> Self {
        Self { store, completions, intake }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Runs one turn: append the utterance, complete, merge, branch.
    ///
    /// On error the entry stays in the store with its pre-failure history, so
    /// a transport retry of the same webhook resumes the conversation; the
    /// transport layer is expected to speak an apology and hang up.
    pub async fn handle_turn(
        &self,
        call_id: &CallId,
        utterance: Option<&str>,
        called_number: &str,
    ) -> Result<TurnDirective, TurnError> {
        let entry = self.store.get_or_create(call_id, called_number).await;
        let mut state = entry.lock().await;

        match self.run_turn(call_id, utterance, &mut state).await {
            Ok(directive) => {
                state.touch();
                if let TurnDirective::Complete { .. } = &directive {
                    drop(state);
                    self.store.remove(call_id).await;
                }
                Ok(directive)
            }
            Err(error) => {
                state.mark_failed();
                warn!(
                    event_name = "call.turn_failed",
                    call_id = %call_id,
                    error_kind = error.kind(),
                    error = %error,
                    "turn failed; entry retained for transport retry"
                );
                Err(error)
            }
        }
    }

    async fn run_turn(
        &self,
        call_id: &CallId,
        utterance: Option<&str>,
        state: &mut ConversationState,
    ) -> Result<TurnDirective, TurnError> {
        if state.phase == CallPhase::FailedAbort {
            state.phase.transition_to(CallPhase::Gathering)?;
        }

        if let Some(text) = utterance {
            state.history.push(TurnMessage::user(text));
        }

        let request = prompt::completion_messages(&state.history, &state.collected_data);
        let raw = self.completions.complete(&request).await?;
        let reply = parse_model_reply(&raw)?;

        state.merge_extracted(reply.extracted_data);
        state.history.push(TurnMessage::assistant(&reply.response_text));

        if !reply.is_complete {
            state.phase.transition_to(CallPhase::Gathering)?;
            return Ok(TurnDirective::GatherNext { prompt: reply.response_text });
        }

        state.phase.transition_to(CallPhase::Terminated)?;
        let record =
            IntakeRecord::from_collected(state.called_number.as_str(), &state.collected_data);
        let persisted = self.persist(call_id, record).await;
        Ok(TurnDirective::Complete { farewell: reply.response_text, persisted })
    }

    /// Issues the upsert and reports whether it landed. Failure is logged and
    /// does not abort the call; the caller still hears the farewell.
    async fn persist(&self, call_id: &CallId, record: IntakeRecord) -> bool {
        let phone_number = record.phone_number.clone();
        match self.intake.upsert(record).await {
            Ok(()) => {
                info!(
                    event_name = "intake.persisted",
                    call_id = %call_id,
                    phone_number = %phone_number,
                    "intake record stored"
                );
                true
            }
            Err(error) => {
                warn!(
                    event_name = "intake.persist_failed",
                    call_id = %call_id,
                    phone_number = %phone_number,
                    error = %error,
                    "intake record was not stored; ending the call anyway"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use tokio::sync::Mutex;

    use carecall_core::MessageRole;
    use carecall_db::InMemoryIntakeRepository;

    use super::*;

    struct ScriptedCompletions {
        replies: Mutex<VecDeque<Result<String, CompletionError>>>,
        requests: Mutex<Vec<Vec<TurnMessage>>>,
    }

    impl ScriptedCompletions {
        fn new(replies: Vec<Result<String, CompletionError>>) -> Self {
            Self { replies: Mutex::new(replies.into_iter().collect()), requests: Mutex::new(Vec::new()) }
        }

        async fn recorded_requests(&self) -> Vec<Vec<TurnMessage>> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedCompletions {
        async fn complete(&self, messages: &[TurnMessage]) -> Result<String, CompletionError> {
            self.requests.lock().await.push(messages.to_vec());
            self.replies.lock().await.pop_front().expect("no scripted reply left")
        }
    }

    fn reply_json(text: &str, extracted: Value, complete: bool) -> Result<String, CompletionError> {
        Ok(json!({
            "responseText": text,
            "extractedData": extracted,
            "isComplete": complete,
        })
        .to_string())
    }

    fn upstream_error() -> Result<String, CompletionError> {
        Err(CompletionError::Upstream { status: 503, body: "over capacity".to_string() })
    }

    fn harness(
        replies: Vec<Result<String, CompletionError>>,
    ) -> (TurnController, Arc<InMemoryIntakeRepository>, Arc<ScriptedCompletions>) {
        let completions = Arc::new(ScriptedCompletions::new(replies));
        let intake = Arc::new(InMemoryIntakeRepository::default());
        let controller = TurnController::new(
            Arc::new(ConversationStore::new()),
            completions.clone(),
            intake.clone(),
        );
        (controller, intake, completions)
    }

    fn call(id: &str) -> CallId {
        CallId(id.to_string())
    }

    #[tokio::test]
    async fn first_turn_without_speech_asks_the_opening_question() {
        let (controller, _, completions) = harness(vec![reply_json(
            "Hi, this is Cara from the clinic. May I have your full name?",
            json!({}),
            false,
        )]);
        let call_id = call("CA200");

        let directive = controller
            .handle_turn(&call_id, None, "+15551230001")
            .await
            .expect("first turn succeeds");

        let TurnDirective::GatherNext { prompt } = directive else {
            panic!("opening turn must keep gathering");
        };
        assert!(prompt.contains("full name"));
        assert!(controller.store().contains(&call_id).await);

        let entry = controller.store().get_or_create(&call_id, "+15551230001").await;
        let state = entry.lock().await;
        assert_eq!(state.history.len(), 1, "assistant greeting only, nothing heard yet");
        assert_eq!(state.history[0].role, MessageRole::Assistant);

        let requests = completions.recorded_requests().await;
        assert_eq!(requests[0].len(), 2, "system script + progress reminder, empty transcript");
    }

    #[tokio::test]
    async fn turns_append_user_then_assistant_in_order() {
        let (controller, _, _) = harness(vec![
            reply_json("Thanks Ada. How old are you?", json!({"full_name": "Ada Lovelace"}), false),
        ]);
        let call_id = call("CA201");

        controller
            .handle_turn(&call_id, Some("My name is Ada Lovelace"), "+15551230001")
            .await
            .expect("turn succeeds");

        let entry = controller.store().get_or_create(&call_id, "+15551230001").await;
        let state = entry.lock().await;
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[state.history.len() - 2].role, MessageRole::User);
        assert_eq!(state.history[state.history.len() - 1].role, MessageRole::Assistant);
        assert_eq!(state.collected_data["full_name"], json!("Ada Lovelace"));
    }

    #[tokio::test]
    async fn completion_request_sandwiches_script_history_and_snapshot() {
        let (controller, _, completions) = harness(vec![
            reply_json("Thanks Ada. How old are you?", json!({"full_name": "Ada"}), false),
            reply_json("Got it. Where do you live?", json!({"age": 36}), false),
        ]);
        let call_id = call("CA202");

        controller
            .handle_turn(&call_id, Some("Ada"), "+15551230001")
            .await
            .expect("first turn succeeds");
        controller
            .handle_turn(&call_id, Some("I am 36"), "+15551230001")
            .await
            .expect("second turn succeeds");

        let requests = completions.recorded_requests().await;
        let second = &requests[1];

        assert_eq!(second[0].role, MessageRole::System);
        assert!(second[0].content.contains("full name"), "script opens the request");
        assert_eq!(second[1].content, "Ada");
        assert_eq!(second[2].content, "Thanks Ada. How old are you?");
        assert_eq!(second[3].content, "I am 36");
        let reminder = &second[second.len() - 1];
        assert_eq!(reminder.role, MessageRole::System);
        assert!(reminder.content.contains("\"full_name\":\"Ada\""), "snapshot rides the reminder");
    }

    #[tokio::test]
    async fn completed_intake_persists_once_and_clears_the_entry() {
        let (controller, intake, _) = harness(vec![
            reply_json("Hi! What is your full name?", json!({}), false),
            reply_json("Thanks. How old are you?", json!({"full_name": "Ada Lovelace"}), false),
            reply_json(
                "And your address?",
                json!({"age": 36, "gender": "female"}),
                false,
            ),
            reply_json(
                "Anything else about your health?",
                json!({"address": "12 Crescent Rd, London"}),
                false,
            ),
            reply_json(
                "Thank you Ada, we have everything. Goodbye!",
                json!({"health_condition": "recurring migraines"}),
                true,
            ),
        ]);
        let call_id = call("CA203");
        let to = "+15551230001";

        controller.handle_turn(&call_id, None, to).await.expect("opening turn");
        controller.handle_turn(&call_id, Some("Ada Lovelace"), to).await.expect("name turn");
        controller.handle_turn(&call_id, Some("36, female"), to).await.expect("age turn");
        controller
            .handle_turn(&call_id, Some("12 Crescent Rd, London"), to)
            .await
            .expect("address turn");
        let directive = controller
            .handle_turn(&call_id, Some("I get recurring migraines"), to)
            .await
            .expect("final turn");

        assert_eq!(
            directive,
            TurnDirective::Complete {
                farewell: "Thank you Ada, we have everything. Goodbye!".to_string(),
                persisted: true,
            }
        );
        assert!(!controller.store().contains(&call_id).await, "entry removed on completion");
        assert_eq!(intake.upsert_calls(), 1, "exactly one upsert per completed call");

        let record = intake
            .find_by_phone_number(to)
            .await
            .expect("lookup succeeds")
            .expect("record stored");
        assert_eq!(record.phone_number, to);
        assert_eq!(record.full_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(record.address.as_deref(), Some("12 Crescent Rd, London"));
        assert_eq!(record.health_condition.as_deref(), Some("recurring migraines"));
    }

    #[tokio::test]
    async fn malformed_reply_keeps_the_entry_for_retry() {
        let (controller, intake, _) =
            harness(vec![Ok("Sure! I'll ask for the name now.".to_string())]);
        let call_id = call("CA204");

        let error = controller
            .handle_turn(&call_id, Some("hello?"), "+15551230001")
            .await
            .expect_err("prose reply must fail the turn");

        assert_eq!(error.kind(), "malformed_reply");
        assert!(controller.store().contains(&call_id).await, "entry leaks forward for retry");
        assert_eq!(intake.upsert_calls(), 0);

        let entry = controller.store().get_or_create(&call_id, "+15551230001").await;
        let state = entry.lock().await;
        assert_eq!(state.phase, CallPhase::FailedAbort);
        assert_eq!(state.history.len(), 1, "user turn recorded, no assistant reply");
    }

    #[tokio::test]
    async fn contract_violations_are_distinguished_from_parse_failures() {
        let (controller, _, _) = harness(vec![Ok(
            json!({"responseText": "Hi", "extractedData": {}}).to_string(),
        )]);
        let call_id = call("CA205");

        let error = controller
            .handle_turn(&call_id, None, "+15551230001")
            .await
            .expect_err("missing isComplete must fail the turn");

        assert_eq!(error.kind(), "contract_violation");
    }

    #[tokio::test]
    async fn upstream_failure_keeps_the_entry() {
        let (controller, _, _) = harness(vec![upstream_error()]);
        let call_id = call("CA206");

        let error = controller
            .handle_turn(&call_id, Some("hello"), "+15551230001")
            .await
            .expect_err("upstream outage must fail the turn");

        assert_eq!(error.kind(), "upstream");
        assert!(controller.store().contains(&call_id).await);
    }

    #[tokio::test]
    async fn retried_webhook_resumes_from_the_pre_failure_history() {
        let (controller, _, completions) = harness(vec![
            upstream_error(),
            reply_json("Sorry about that. What is your full name?", json!({}), false),
        ]);
        let call_id = call("CA207");

        controller
            .handle_turn(&call_id, Some("My name is Ada"), "+15551230001")
            .await
            .expect_err("first delivery fails");
        let directive = controller
            .handle_turn(&call_id, Some("My name is Ada"), "+15551230001")
            .await
            .expect("retried delivery succeeds");

        assert!(matches!(directive, TurnDirective::GatherNext { .. }));

        let entry = controller.store().get_or_create(&call_id, "+15551230001").await;
        let state = entry.lock().await;
        assert_eq!(state.phase, CallPhase::Gathering, "retry resumes gathering");
        assert_eq!(state.history.len(), 3, "failed turn's user message is part of the transcript");

        let requests = completions.recorded_requests().await;
        assert_eq!(requests[1].len(), 4, "retry replays both user messages");
    }

    #[tokio::test]
    async fn persistence_failure_is_observable_but_the_call_still_ends() {
        let (controller, intake, _) = harness(vec![reply_json(
            "All set, thank you. Goodbye!",
            json!({"full_name": "Ada Lovelace"}),
            true,
        )]);
        intake.reject_writes(true);
        let call_id = call("CA208");

        let directive = controller
            .handle_turn(&call_id, Some("that's everything"), "+15551230001")
            .await
            .expect("turn succeeds even when the upsert fails");

        let TurnDirective::Complete { persisted, .. } = directive else {
            panic!("completed call must hang up");
        };
        assert!(!persisted, "failed upsert must be visible in the directive");
        assert_eq!(intake.upsert_calls(), 1, "the upsert was attempted");
        assert!(!controller.store().contains(&call_id).await, "entry removed regardless");
    }

    #[tokio::test]
    async fn interleaved_calls_never_share_state() {
        let (controller, _, _) = harness(vec![
            reply_json("Hello caller one, your name?", json!({}), false),
            reply_json("Hello caller two, your name?", json!({}), false),
            reply_json("Thanks!", json!({"full_name": "Ada"}), false),
            reply_json("Thanks!", json!({"full_name": "Grace"}), false),
        ]);
        let first = call("CA209");
        let second = call("CA210");

        controller.handle_turn(&first, None, "+15551230001").await.expect("c1 t1");
        controller.handle_turn(&second, None, "+15551230002").await.expect("c2 t1");
        controller.handle_turn(&first, Some("Ada"), "+15551230001").await.expect("c1 t2");
        controller.handle_turn(&second, Some("Grace"), "+15551230002").await.expect("c2 t2");

        let first_entry = controller.store().get_or_create(&first, "+15551230001").await;
        let second_entry = controller.store().get_or_create(&second, "+15551230002").await;
        let first_state = first_entry.lock().await;
        let second_state = second_entry.lock().await;

        assert_eq!(first_state.collected_data["full_name"], json!("Ada"));
        assert_eq!(second_state.collected_data["full_name"], json!("Grace"));
        assert_eq!(first_state.called_number, "+15551230001");
        assert_eq!(second_state.called_number, "+15551230002");
        assert_eq!(first_state.history.len(), 3);

        let mut map = Map::new();
        map.insert("full_name".to_string(), json!("Ada"));
        assert_eq!(first_state.collected_data, map);
    }
}
