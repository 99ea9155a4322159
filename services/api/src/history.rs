//! Session History
//!
//! Records that a user finished a call with a companion and lists the most
//! recent sessions. [`HistoryRecorder`] adapts a [`HistoryStore`] to the call
//! controller's non-blocking `SessionHistory` hook by writing on a spawned task.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use companion_core::{
    call::SessionHistory,
    companion::validate_companion_row,
    store::{CompanionStore, InMemoryStore},
};
use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::SessionHistoryEntry;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Inserts one history row. A missing user is passed through for the
    /// store to reject.
    async fn add_session(&self, companion_id: Uuid, user_id: Option<&str>) -> Result<()>;

    /// The user's most recent sessions, newest first.
    async fn recent_sessions(&self, user_id: &str, limit: u32) -> Result<Vec<SessionHistoryEntry>>;
}

/// History kept in memory, joined against an [`InMemoryStore`].
pub struct InMemoryHistory {
    companions: Arc<InMemoryStore>,
    next_id: AtomicI64,
    entries: RwLock<Vec<SessionHistoryEntry>>,
}

impl InMemoryHistory {
    pub fn new(companions: Arc<InMemoryStore>) -> Self {
        Self {
            companions,
            next_id: AtomicI64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    async fn add_session(&self, companion_id: Uuid, user_id: Option<&str>) -> Result<()> {
        let user_id = user_id.context("user_id is required for session history")?;
        let row = self
            .companions
            .select_single(&companion_id.to_string())
            .await
            .with_context(|| format!("companion {companion_id} does not exist"))?;
        let companion = validate_companion_row(&row)
            .map_err(|issues| anyhow!("companion {companion_id} is invalid: {issues:?}"))?;

        self.entries.write().await.push(SessionHistoryEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            companion_id,
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            companion_name: companion.name,
            subject: companion.subject,
            topic: companion.topic,
            duration: companion.duration,
        });
        Ok(())
    }

    async fn recent_sessions(&self, user_id: &str, limit: u32) -> Result<Vec<SessionHistoryEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| entry.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Writes a history row for the calling user whenever a call ends.
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
    user_id: Option<String>,
}

impl HistoryRecorder {
    pub fn new(store: Arc<dyn HistoryStore>, user_id: Option<String>) -> Self {
        Self { store, user_id }
    }
}

impl SessionHistory for HistoryRecorder {
    fn record_session(&self, companion_id: Uuid) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("session history needs a running Tokio runtime")?;
        let store = self.store.clone();
        let user_id = self.user_id.clone();

        runtime.spawn(async move {
            match store.add_session(companion_id, user_id.as_deref()).await {
                Ok(()) => info!(%companion_id, ?user_id, "Session recorded in history"),
                Err(e) => warn!(%companion_id, ?user_id, error = ?e, "Failed to record session"),
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::companion::CompanionRecord;
    use std::time::Duration;

    async fn companion(store: &InMemoryStore, name: &str) -> Uuid {
        let record = CompanionRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            name: name.to_string(),
            subject: "history".to_string(),
            topic: "Rome".to_string(),
            style: "formal".to_string(),
            duration: 20,
            author: "author".to_string(),
        };
        store.seed(&record).await.unwrap();
        record.id
    }

    #[tokio::test]
    async fn test_recent_sessions_newest_first_per_user() {
        let companions = Arc::new(InMemoryStore::new());
        let a = companion(&companions, "Chrono").await;
        let b = companion(&companions, "Verba").await;
        let history = InMemoryHistory::new(companions);

        history.add_session(a, Some("user_1")).await.unwrap();
        history.add_session(b, Some("user_2")).await.unwrap();
        history.add_session(b, Some("user_1")).await.unwrap();

        let sessions = history.recent_sessions("user_1", 10).await.unwrap();
        let names: Vec<&str> = sessions.iter().map(|s| s.companion_name.as_str()).collect();
        assert_eq!(names, vec!["Verba", "Chrono"]);
        assert_eq!(history.recent_sessions("user_1", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_session_requires_user_and_companion() {
        let companions = Arc::new(InMemoryStore::new());
        let a = companion(&companions, "Chrono").await;
        let history = InMemoryHistory::new(companions);

        assert!(history.add_session(a, None).await.is_err());
        assert!(history.add_session(Uuid::new_v4(), Some("u")).await.is_err());
    }

    #[tokio::test]
    async fn test_recorder_writes_in_background() {
        let companions = Arc::new(InMemoryStore::new());
        let a = companion(&companions, "Chrono").await;
        let history = Arc::new(InMemoryHistory::new(companions));
        let recorder = HistoryRecorder::new(history.clone(), Some("user_1".to_string()));

        recorder.record_session(a).unwrap();

        let mut recorded = Vec::new();
        for _ in 0..50 {
            recorded = history.recent_sessions("user_1", 10).await.unwrap();
            if !recorded.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].companion_id, a);
    }

    #[test]
    fn test_recorder_without_runtime_fails() {
        let companions = Arc::new(InMemoryStore::new());
        let recorder = HistoryRecorder::new(Arc::new(InMemoryHistory::new(companions)), None);
        assert!(recorder.record_session(Uuid::new_v4()).is_err());
    }
}
