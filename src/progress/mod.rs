//! Session-keyed progress store.
//!
//! One record per in-flight download, keyed by the caller-chosen session
//! token. The job owning a session is the only writer; the poll endpoint
//! reads snapshots at any time. Terminal records (`completed`/`error`) are
//! retained for a grace period so pollers racing job completion still see
//! the final state, then purged lazily on the next store access. A grace of
//! zero removes them on the access immediately following `finish`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Starting,
    Progress,
    Completed,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Error)
    }
}

/// Snapshot of one session's progress, serialized for the poll endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressRecord {
    pub status: ProgressStatus,
    pub message: String,
    pub percentage: u8,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

pub struct ProgressTracker {
    sessions: RwLock<HashMap<String, ProgressRecord>>,
    retain_terminal: Duration,
}

impl ProgressTracker {
    pub fn new(retain_terminal: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            retain_terminal,
        }
    }

    /// Create the record for a starting job. Replaces any stale record left
    /// under the same token.
    pub async fn begin(&self, session: &str) {
        let mut sessions = self.sessions.write().await;
        Self::purge_expired(&mut sessions, self.retain_terminal);
        sessions.insert(
            session.to_string(),
            ProgressRecord {
                status: ProgressStatus::Starting,
                message: "Starting download".to_string(),
                percentage: 0,
                updated_at: Utc::now(),
            },
        );
        debug!(session, "progress record created");
    }

    /// Record an intermediate update. Percentage never regresses within a
    /// session. Updates for unknown sessions are dropped.
    pub async fn update(&self, session: &str, message: impl Into<String>, percentage: u8) {
        let mut sessions = self.sessions.write().await;
        if let Some(record) = sessions.get_mut(session) {
            record.status = ProgressStatus::Progress;
            record.message = message.into();
            record.percentage = record.percentage.max(percentage.min(100));
            record.updated_at = Utc::now();
        }
    }

    /// Mark the session terminal. Completion pins the percentage at 100;
    /// errors keep the last reported value.
    pub async fn finish(&self, session: &str, status: ProgressStatus, message: impl Into<String>) {
        debug_assert!(status.is_terminal());
        let mut sessions = self.sessions.write().await;
        let percentage = match status {
            ProgressStatus::Completed => 100,
            _ => sessions.get(session).map(|r| r.percentage).unwrap_or(0),
        };
        sessions.insert(
            session.to_string(),
            ProgressRecord {
                status,
                message: message.into(),
                percentage,
                updated_at: Utc::now(),
            },
        );
        debug!(session, ?status, "progress record finalized");
    }

    /// Read a snapshot. `None` covers both never-issued tokens and terminal
    /// records past their retention window.
    pub async fn read(&self, session: &str) -> Option<ProgressRecord> {
        let mut sessions = self.sessions.write().await;
        Self::purge_expired(&mut sessions, self.retain_terminal);
        sessions.get(session).cloned()
    }

    fn purge_expired(sessions: &mut HashMap<String, ProgressRecord>, retain: Duration) {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retain).unwrap_or_else(|_| chrono::Duration::zero());
        sessions.retain(|_, record| !record.status.is_terminal() || record.updated_at > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_begin_update_finish() {
        let tracker = ProgressTracker::new(Duration::from_secs(300));

        tracker.begin("s1").await;
        let record = tracker.read("s1").await.unwrap();
        assert_eq!(record.status, ProgressStatus::Starting);
        assert_eq!(record.percentage, 0);

        tracker.update("s1", "halfway", 50).await;
        let record = tracker.read("s1").await.unwrap();
        assert_eq!(record.status, ProgressStatus::Progress);
        assert_eq!(record.percentage, 50);

        tracker.finish("s1", ProgressStatus::Completed, "done").await;
        let record = tracker.read("s1").await.unwrap();
        assert_eq!(record.status, ProgressStatus::Completed);
        assert_eq!(record.percentage, 100);
    }

    #[tokio::test]
    async fn percentage_never_regresses() {
        let tracker = ProgressTracker::new(Duration::from_secs(300));

        tracker.begin("s1").await;
        tracker.update("s1", "a", 40).await;
        tracker.update("s1", "b", 10).await;

        let record = tracker.read("s1").await.unwrap();
        assert_eq!(record.percentage, 40);
        assert_eq!(record.message, "b");
    }

    #[tokio::test]
    async fn zero_retention_purges_terminal_on_next_access() {
        let tracker = ProgressTracker::new(Duration::ZERO);

        tracker.begin("s1").await;
        tracker.finish("s1", ProgressStatus::Error, "boom").await;

        assert!(tracker.read("s1").await.is_none());
    }

    #[tokio::test]
    async fn terminal_record_survives_within_grace() {
        let tracker = ProgressTracker::new(Duration::from_secs(300));

        tracker.begin("s1").await;
        tracker.finish("s1", ProgressStatus::Completed, "done").await;

        let record = tracker.read("s1").await.unwrap();
        assert_eq!(record.status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_session_reads_none() {
        let tracker = ProgressTracker::new(Duration::from_secs(300));
        assert!(tracker.read("never-issued").await.is_none());
    }

    #[tokio::test]
    async fn updates_for_unknown_sessions_are_dropped() {
        let tracker = ProgressTracker::new(Duration::from_secs(300));
        tracker.update("ghost", "ignored", 10).await;
        assert!(tracker.read("ghost").await.is_none());
    }
}
