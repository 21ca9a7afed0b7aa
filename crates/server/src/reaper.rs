//! Background sweep that drops abandoned conversations.
//!
//! A caller who hangs up mid-script never produces a completing turn, so the
//! store entry would sit forever. The reaper ticks on a config-driven
//! interval and purges entries idle past the TTL; entries mid-turn hold
//! their per-call lock and are skipped until the next sweep.

use std::sync::Arc;
use std::time::Duration;

use carecall_agent::ConversationStore;
use tokio::task::JoinHandle;
use tracing::info;

pub fn spawn(
    store: Arc<ConversationStore>,
    idle_ttl_secs: u64,
    sweep_interval_secs: u64,
) -> JoinHandle<()> {
    let ttl = Duration::from_secs(idle_ttl_secs);
    let interval = Duration::from_secs(sweep_interval_secs);

    info!(
        event_name = "system.reaper.start",
        idle_ttl_secs,
        sweep_interval_secs,
        "conversation reaper started"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            sweep_once(&store, ttl).await;
        }
    })
}

async fn sweep_once(store: &ConversationStore, ttl: Duration) {
    let purged = store.purge_idle(ttl).await;
    if !purged.is_empty() {
        info!(
            event_name = "call.reaped",
            purged = purged.len(),
            call_ids = ?purged,
            "dropped abandoned conversations"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use carecall_agent::ConversationStore;
    use carecall_core::CallId;

    use super::sweep_once;

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_idle_entries_and_keeps_fresh_ones() {
        let store = Arc::new(ConversationStore::new());
        let stale = CallId("CA-stale".to_string());
        let fresh = CallId("CA-fresh".to_string());

        store.get_or_create(&stale, "+15550100").await;
        tokio::time::advance(Duration::from_secs(899)).await;
        store.get_or_create(&fresh, "+15550101").await;
        tokio::time::advance(Duration::from_secs(1)).await;

        sweep_once(&store, Duration::from_secs(900)).await;

        assert!(!store.contains(&stale).await, "idle entry should be reaped");
        assert!(store.contains(&fresh).await, "recent entry should survive the sweep");
    }
}
