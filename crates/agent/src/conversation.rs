use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use carecall_core::{CallId, CallPhase, TurnMessage};

/// In-flight state for one call.
///
/// The transcript is append-only and replayed verbatim to the completion
/// service; `collected_data` only grows or overwrites, a field is never
/// deleted mid-conversation.
pub struct ConversationState {
    pub phase: CallPhase,
    pub history: Vec<TurnMessage>,
    pub collected_data: Map<String, Value>,
    /// Number the call was placed to; becomes the intake record key.
    pub called_number: String,
    last_activity: Instant,
}

impl ConversationState {
    fn new(called_number: impl Into<String>) -> Self {
        Self {
            phase: CallPhase::Gathering,
            history: Vec::new(),
            collected_data: Map::new(),
            called_number: called_number.into(),
            last_activity: Instant::now(),
        }
    }

    /// Shallow merge: each extracted key overwrites any collected value.
    pub fn merge_extracted(&mut self, extracted: Map<String, Value>) {
        for (field, value) in extracted {
            self.collected_data.insert(field, value);
        }
    }

    /// Phase bookkeeping for a turn that ended in an apology. The entry is
    /// kept so a transport retry can resume from the pre-failure history.
    pub fn mark_failed(&mut self) {
        if self.phase.can_transition_to(CallPhase::FailedAbort) {
            self.phase = CallPhase::FailedAbort;
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Process-wide registry of in-flight calls, keyed by call sid.
///
/// Each entry hands out its own lock. A webhook turn holds that lock for the
/// whole turn, completion call included, so two deliveries for the same sid
/// serialize instead of racing; turns for different sids share nothing. A
/// caller who hangs up mid-script never reports completion, so entries that
/// sit idle are reaped by [`ConversationStore::purge_idle`].
#[derive(Default)]
pub struct ConversationStore {
    entries: Mutex<HashMap<CallId, Arc<Mutex<ConversationState>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `call_id`, creating an empty gathering state on
    /// the first turn of a call.
    pub async fn get_or_create(
        &self,
        call_id: &CallId,
        called_number: &str,
    ) -> Arc<Mutex<ConversationState>> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(call_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new(called_number))))
            .clone()
    }

    /// Drops the entry; a no-op when the call is unknown.
    pub async fn remove(&self, call_id: &CallId) {
        let mut entries = self.entries.lock().await;
        entries.remove(call_id);
    }

    pub async fn contains(&self, call_id: &CallId) -> bool {
        self.entries.lock().await.contains_key(call_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Removes every entry idle for at least `ttl` and returns the ids.
    ///
    /// Entries whose per-call lock is held are in the middle of a turn and
    /// are skipped; the turn refreshes the activity clock when it finishes.
    pub async fn purge_idle(&self, ttl: Duration) -> Vec<CallId> {
        let mut entries = self.entries.lock().await;
        let mut expired = Vec::new();
        for (call_id, entry) in entries.iter() {
            let Ok(state) = entry.try_lock() else {
                continue;
            };
            if state.idle_for() >= ttl {
                expired.push(call_id.clone());
            }
        }
        for call_id in &expired {
            entries.remove(call_id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str) -> CallId {
        CallId(id.to_string())
    }

    fn extraction(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs.iter().map(|(key, value)| (key.to_string(), json!(value))).collect()
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_entry_until_removed() {
        let store = ConversationStore::new();
        let call_id = call("CA100");

        let first = store.get_or_create(&call_id, "+15551230001").await;
        let second = store.get_or_create(&call_id, "+15551230001").await;

        assert!(Arc::ptr_eq(&first, &second), "same call sid must share one entry");
        assert_eq!(store.len().await, 1);

        first.lock().await.history.push(TurnMessage::assistant("Hello!"));
        assert_eq!(second.lock().await.history.len(), 1);
    }

    #[tokio::test]
    async fn remove_is_a_no_op_for_unknown_calls_and_resets_known_ones() {
        let store = ConversationStore::new();
        let call_id = call("CA101");

        store.remove(&call_id).await;
        assert!(store.is_empty().await);

        let entry = store.get_or_create(&call_id, "+15551230001").await;
        entry.lock().await.collected_data.insert("full_name".to_string(), json!("Ada"));
        store.remove(&call_id).await;
        assert!(!store.contains(&call_id).await);

        let fresh = store.get_or_create(&call_id, "+15551230001").await;
        assert!(fresh.lock().await.collected_data.is_empty(), "entry recreated empty");
    }

    #[tokio::test]
    async fn merge_overwrites_but_never_deletes() {
        let store = ConversationStore::new();
        let entry = store.get_or_create(&call("CA102"), "+15551230001").await;
        let mut state = entry.lock().await;

        state.merge_extracted(extraction(&[("full_name", "Ada"), ("address", "12 Crescent Rd")]));
        state.merge_extracted(extraction(&[("full_name", "Ada Lovelace")]));

        assert_eq!(state.collected_data.len(), 2);
        assert_eq!(state.collected_data["full_name"], json!("Ada Lovelace"));
        assert_eq!(state.collected_data["address"], json!("12 Crescent Rd"));
    }

    #[tokio::test]
    async fn merge_is_idempotent_for_repeated_extractions() {
        let store = ConversationStore::new();
        let entry = store.get_or_create(&call("CA103"), "+15551230001").await;
        let mut state = entry.lock().await;

        state.merge_extracted(extraction(&[("full_name", "A")]));
        state.merge_extracted(extraction(&[("full_name", "A")]));

        assert_eq!(state.collected_data.len(), 1);
        assert_eq!(state.collected_data["full_name"], json!("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_idle_removes_only_stale_entries() {
        let store = ConversationStore::new();
        let stale = call("CA104");
        let active = call("CA105");

        store.get_or_create(&stale, "+15551230001").await;
        tokio::time::advance(Duration::from_secs(1200)).await;
        store.get_or_create(&active, "+15551230002").await;

        let purged = store.purge_idle(Duration::from_secs(900)).await;

        assert_eq!(purged, vec![stale.clone()]);
        assert!(!store.contains(&stale).await);
        assert!(store.contains(&active).await);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_idle_skips_entries_with_a_turn_in_flight() {
        let store = ConversationStore::new();
        let call_id = call("CA106");

        let entry = store.get_or_create(&call_id, "+15551230001").await;
        let guard = entry.lock().await;
        tokio::time::advance(Duration::from_secs(1200)).await;

        let purged = store.purge_idle(Duration::from_secs(900)).await;
        assert!(purged.is_empty());
        assert!(store.contains(&call_id).await);

        drop(guard);
        let purged = store.purge_idle(Duration::from_secs(900)).await;
        assert_eq!(purged, vec![call_id]);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_resets_the_idle_clock() {
        let store = ConversationStore::new();
        let call_id = call("CA107");

        let entry = store.get_or_create(&call_id, "+15551230001").await;
        tokio::time::advance(Duration::from_secs(800)).await;
        entry.lock().await.touch();
        tokio::time::advance(Duration::from_secs(800)).await;

        let purged = store.purge_idle(Duration::from_secs(900)).await;
        assert!(purged.is_empty(), "entry was active 800s ago, under the 900s ttl");
    }
}
