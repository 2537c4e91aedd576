use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Turns older than this never reach a completion request.
const RETENTION_HOURS: i64 = 24;

/// History cap fed to a completion request. One below the 20-message context
/// budget: the new user message takes the remaining slot.
const MAX_CONTEXT_TURNS: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

/// One role-tagged message in a conversation history.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// In-memory per-user turn history, keyed by WeChat OpenID.
///
/// Turn-level eviction is lazy: reads drop turns past the retention window
/// and cap what remains. The identity table itself is never evicted. It
/// grows with distinct senders until the process restarts, and nothing is
/// persisted (known limitation, kept as-is).
#[derive(Default)]
pub struct ConversationStore {
    turns: Mutex<HashMap<String, Vec<ConversationTurn>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recent history for one sender: age-filtered, then capped to the most
    /// recent turns.
    pub async fn recent(&self, open_id: &str) -> Vec<ConversationTurn> {
        let cutoff = Utc::now() - Duration::hours(RETENTION_HOURS);
        let mut turns = self.turns.lock().await;
        let Some(entry) = turns.get_mut(open_id) else {
            return Vec::new();
        };
        entry.retain(|turn| turn.at > cutoff);
        let start = entry.len().saturating_sub(MAX_CONTEXT_TURNS);
        entry[start..].to_vec()
    }

    /// Record one completed exchange: the user turn, then the assistant turn.
    /// Called only after the completion succeeded; failed calls must not
    /// pollute history.
    pub async fn record_exchange(&self, open_id: &str, user_text: &str, assistant_text: &str) {
        let now = Utc::now();
        let mut turns = self.turns.lock().await;
        let entry = turns.entry(open_id.to_string()).or_default();
        entry.push(ConversationTurn {
            role: TurnRole::User,
            content: user_text.to_string(),
            at: now,
        });
        entry.push(ConversationTurn {
            role: TurnRole::Assistant,
            content: assistant_text.to_string(),
            at: now,
        });
    }

    #[cfg(test)]
    async fn push_turn_at(&self, open_id: &str, role: TurnRole, content: &str, at: DateTime<Utc>) {
        let mut turns = self.turns.lock().await;
        turns.entry(open_id.to_string()).or_default().push(ConversationTurn {
            role,
            content: content.to_string(),
            at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_identity_has_no_history() {
        let store = ConversationStore::new();
        assert!(store.recent("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn exchange_appends_user_then_assistant() {
        let store = ConversationStore::new();
        store.record_exchange("user1", "你好", "你好呀").await;

        let history = store.recent("user1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[0].content, "你好");
        assert_eq!(history[1].role, TurnRole::Assistant);
        assert_eq!(history[1].content, "你好呀");
    }

    #[tokio::test]
    async fn turns_past_the_retention_window_are_dropped() {
        let store = ConversationStore::new();
        let stale = Utc::now() - Duration::hours(RETENTION_HOURS + 1);
        store
            .push_turn_at("user1", TurnRole::User, "old question", stale)
            .await;
        store
            .push_turn_at("user1", TurnRole::Assistant, "old answer", stale)
            .await;
        store.record_exchange("user1", "new question", "new answer").await;

        let history = store.recent("user1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "new question");
        assert_eq!(history[1].content, "new answer");
    }

    #[tokio::test]
    async fn read_is_capped_to_the_most_recent_turns() {
        let store = ConversationStore::new();
        // 13 exchanges = 26 turns, well past the cap.
        for i in 0..13 {
            store
                .record_exchange("user1", &format!("q{i}"), &format!("a{i}"))
                .await;
        }

        let history = store.recent("user1").await;
        assert_eq!(history.len(), MAX_CONTEXT_TURNS);
        // The newest turn survives; the oldest ones fall off the front.
        assert_eq!(history.last().unwrap().content, "a12");
        assert_eq!(history[0].content, "a3");
    }

    #[tokio::test]
    async fn identities_are_partitioned() {
        let store = ConversationStore::new();
        store.record_exchange("user1", "q1", "a1").await;
        store.record_exchange("user2", "q2", "a2").await;

        let first = store.recent("user1").await;
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|turn| !turn.content.contains('2')));
        assert_eq!(store.recent("user2").await.len(), 2);
    }
}
