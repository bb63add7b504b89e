//! The session repository boundary: durable metadata behind a thin trait.
//!
//! `sig-core` depends only on [`SessionRepository`]; `sig-store` provides the
//! real Postgres-backed implementation, and [`MemorySessionRepository`] here
//! serves `sig-core`'s own unit tests and the integration test crate —
//! depend on the trait, never the concrete store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{RepoResult, RepositoryError};

/// Maximum allowed file size: 100 GiB.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024 * 1024;

/// Lifecycle status of a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Created, waiting for a receiver to present the code.
    Waiting,
    /// A receiver has joined; signaling is in progress.
    Active,
    /// Transfer finished (only reachable in the status-retaining deployment
    /// variant; the default policy deletes the row instead).
    Completed,
}

/// A durable session row. Never carries plaintext `fileName`/`fileType` —
/// only the field-encryption envelope produced by `sig_crypto::FieldCipher`.
#[derive(Debug, Clone)]
pub struct Session {
    /// Canonical 36-character lowercase hex-with-hyphens identifier.
    pub id: String,
    /// Encrypted filename envelope.
    pub encrypted_file_name: String,
    /// Encrypted MIME type envelope.
    pub encrypted_file_type: String,
    /// Size in bytes, full 64-bit precision.
    pub file_size: u64,
    /// Client-supplied integrity hash, opaque and never verified server-side.
    pub file_hash: Option<String>,
    /// Hash of the one-time access code, if the deployment chooses to
    /// persist one alongside the in-memory registry entry.
    pub code_hash: Option<String>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Age of this session relative to `now`.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

/// The five durable operations the signaling core needs from a store.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session row with a freshly assigned random 128-bit id.
    /// Returns the assigned id.
    async fn create(
        &self,
        encrypted_file_name: String,
        file_size: u64,
        encrypted_file_type: String,
        code_hash: Option<String>,
        file_hash: Option<String>,
    ) -> RepoResult<String>;

    /// Look up a session by id. Returns `None` for unknown or deleted ids.
    async fn find(&self, id: &str) -> RepoResult<Option<Session>>;

    /// Set a session's status. Idempotent; transitioning `COMPLETED` back to
    /// `ACTIVE` is rejected as a constraint violation.
    async fn set_status(&self, id: &str, status: SessionStatus) -> RepoResult<()>;

    /// Delete a session row outright.
    async fn delete(&self, id: &str) -> RepoResult<()>;

    /// Delete every row older than `cutoff`, optionally restricted to the
    /// given set of statuses. Returns the number of rows deleted.
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        status_filter: Option<&[SessionStatus]>,
    ) -> RepoResult<u64>;
}

/// An in-memory `SessionRepository`, used for tests and local development.
#[derive(Default)]
pub struct MemorySessionRepository {
    rows: Arc<DashMap<String, Session>>,
}

impl MemorySessionRepository {
    /// Construct an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
        }
    }

    /// Test/introspection helper: total row count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Test/introspection helper.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(
        &self,
        encrypted_file_name: String,
        file_size: u64,
        encrypted_file_type: String,
        code_hash: Option<String>,
        file_hash: Option<String>,
    ) -> RepoResult<String> {
        let id = Uuid::new_v4().to_string();
        let session = Session {
            id: id.clone(),
            encrypted_file_name,
            encrypted_file_type,
            file_size,
            file_hash,
            code_hash,
            status: SessionStatus::Waiting,
            created_at: Utc::now(),
        };
        self.rows.insert(id.clone(), session);
        Ok(id)
    }

    async fn find(&self, id: &str) -> RepoResult<Option<Session>> {
        Ok(self.rows.get(id).map(|entry| entry.value().clone()))
    }

    async fn set_status(&self, id: &str, status: SessionStatus) -> RepoResult<()> {
        let mut entry = match self.rows.get_mut(id) {
            Some(entry) => entry,
            None => {
                return Err(RepositoryError::ConstraintViolation(
                    "session not found".into(),
                ))
            }
        };

        if entry.status == SessionStatus::Completed && status == SessionStatus::Active {
            return Err(RepositoryError::ConstraintViolation(
                "cannot transition COMPLETED back to ACTIVE".into(),
            ));
        }

        entry.status = status;
        Ok(())
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        self.rows.remove(id);
        Ok(())
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        status_filter: Option<&[SessionStatus]>,
    ) -> RepoResult<u64> {
        let matches = |status: SessionStatus| -> bool {
            status_filter
                .map(|filter| filter.contains(&status))
                .unwrap_or(true)
        };

        let to_delete: Vec<String> = self
            .rows
            .iter()
            .filter(|entry| entry.created_at < cutoff && matches(entry.status))
            .map(|entry| entry.key().clone())
            .collect();

        let count = to_delete.len() as u64;
        for id in to_delete {
            self.rows.remove(&id);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_find_roundtrip() {
        let repo = MemorySessionRepository::new();
        let id = repo
            .create("enc-name".into(), 1024, "enc-type".into(), None, None)
            .await
            .unwrap();

        let session = repo.find(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Waiting);
        assert_eq!(session.file_size, 1024);
    }

    #[tokio::test]
    async fn find_unknown_id_returns_none() {
        let repo = MemorySessionRepository::new();
        assert!(repo.find("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_status_is_idempotent() {
        let repo = MemorySessionRepository::new();
        let id = repo
            .create("n".into(), 1, "t".into(), None, None)
            .await
            .unwrap();

        repo.set_status(&id, SessionStatus::Active).await.unwrap();
        repo.set_status(&id, SessionStatus::Active).await.unwrap();

        let session = repo.find(&id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Active);
    }

    #[tokio::test]
    async fn completed_cannot_go_back_to_active() {
        let repo = MemorySessionRepository::new();
        let id = repo
            .create("n".into(), 1, "t".into(), None, None)
            .await
            .unwrap();

        repo.set_status(&id, SessionStatus::Completed).await.unwrap();
        let result = repo.set_status(&id, SessionStatus::Active).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_older_than_respects_status_filter() {
        let repo = MemorySessionRepository::new();
        let id = repo
            .create("n".into(), 1, "t".into(), None, None)
            .await
            .unwrap();
        repo.set_status(&id, SessionStatus::Active).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let deleted = repo
            .delete_older_than(cutoff, Some(&[SessionStatus::Waiting, SessionStatus::Completed]))
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert!(repo.find(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_older_than_deletes_matching_rows() {
        let repo = MemorySessionRepository::new();
        let id = repo
            .create("n".into(), 1, "t".into(), None, None)
            .await
            .unwrap();

        let cutoff = Utc::now() + chrono::Duration::seconds(1);
        let deleted = repo.delete_older_than(cutoff, None).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(repo.find(&id).await.unwrap().is_none());
    }
}
