//! Session aggregate and the per-user session registry.
//!
//! One `Session` per user id, each behind its own `tokio::sync::Mutex` so
//! turns for the same user are strictly serialized while different users
//! proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::context::SessionContext;
use crate::engine::state::EngineState;

/// A single user's in-progress conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub state: EngineState,
    pub context: SessionContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, state: EngineState) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            state,
            context: SessionContext::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record activity; called by the router on every handled turn.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to a new state. Entering a hub drops the sticky flag so the
    /// next turn routes through the graph again; accumulators are cleared
    /// separately by wizard entry and cancel handling.
    pub fn enter(&mut self, state: EngineState) {
        if state.is_hub() || state.is_terminal() {
            self.context.clear_sticky();
        }
        self.state = state;
        self.touch();
    }
}

/// Registry of live sessions, keyed by user id.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Fetch the lock for a user's session, creating the session in
    /// `initial` state on first contact. The returned handle is the
    /// serialization point for that user's turns.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        initial: EngineState,
    ) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(user_id, initial))))
            .clone()
    }

    /// Look up an existing session without creating one.
    pub async fn get(&self, user_id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.lock().await.get(user_id).cloned()
    }

    /// Drop sessions idle past the configured timeout. Returns how many
    /// were pruned. Sessions are never hard-deleted from storage; only the
    /// in-memory handle is released.
    pub async fn prune_idle(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.idle_timeout).unwrap_or(chrono::Duration::hours(1));
        let mut sessions = self.sessions.lock().await;
        let mut stale = Vec::new();
        for (user_id, handle) in sessions.iter() {
            if let Ok(session) = handle.try_lock() {
                if session.updated_at < cutoff {
                    stale.push(user_id.clone());
                }
            }
        }
        for user_id in &stale {
            sessions.remove(user_id);
        }
        stale.len()
    }

    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_user_turns_serialize_on_one_lock() {
        let manager = Arc::new(SessionManager::new(Duration::from_secs(3600)));
        let handle = manager.get_or_create("u1", EngineState::MainMenu).await;

        // Two rapid "select variable" taps must not race the accumulator.
        let mut tasks = Vec::new();
        for item in ["Age", "Age", "Income"] {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                let mut session = handle.lock().await;
                session.context.select("predictors", item);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let session = handle.lock().await;
        let mut selected = session.context.accumulator("predictors").to_vec();
        selected.sort();
        assert_eq!(selected, ["Age", "Income"]);
    }

    #[tokio::test]
    async fn sessions_are_independent_per_user() {
        let manager = SessionManager::new(Duration::from_secs(3600));
        let a = manager.get_or_create("a", EngineState::MainMenu).await;
        let b = manager.get_or_create("b", EngineState::SignupName).await;
        assert_eq!(a.lock().await.state, EngineState::MainMenu);
        assert_eq!(b.lock().await.state, EngineState::SignupName);
        assert_eq!(manager.count().await, 2);
    }

    #[tokio::test]
    async fn hub_entry_drops_sticky_flag() {
        let mut session = Session::new("u1", EngineState::PredictorSelect);
        session.context.select("predictors", "Age");
        session.context.set_sticky("awaiting_chart_title");

        session.enter(EngineState::MainMenu);

        assert_eq!(session.context.sticky(), None);
        // Accumulators survive hub entry (project resume depends on it).
        assert_eq!(session.context.accumulator("predictors"), ["Age"]);
    }

    #[tokio::test]
    async fn prune_drops_only_idle_sessions() {
        let manager = SessionManager::new(Duration::from_secs(0));
        manager.get_or_create("old", EngineState::MainMenu).await;
        // With a zero timeout everything is instantly stale.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(manager.prune_idle().await, 1);
        assert_eq!(manager.count().await, 0);
    }
}
