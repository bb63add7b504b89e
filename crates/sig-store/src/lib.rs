//! Postgres-backed [`SessionRepository`] for the signaling core.
//!
//! `sig-core` never depends on this crate — only the reverse — keeping the
//! state-machine crate free of any concrete storage dependency. `sig-server`
//! is the only crate that links both.

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use uuid::Uuid;

use sig_core::error::{RepoResult, RepositoryError};
use sig_core::repository::{Session, SessionRepository, SessionStatus};

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Waiting => "WAITING",
        SessionStatus::Active => "ACTIVE",
        SessionStatus::Completed => "COMPLETED",
    }
}

fn parse_status(raw: &str) -> RepoResult<SessionStatus> {
    match raw {
        "WAITING" => Ok(SessionStatus::Waiting),
        "ACTIVE" => Ok(SessionStatus::Active),
        "COMPLETED" => Ok(SessionStatus::Completed),
        other => Err(RepositoryError::ConstraintViolation(
            format!("unrecognized session status {other}").into(),
        )),
    }
}

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            tracing::warn!(%err, "sig-store: pool unavailable");
            RepositoryError::StoreUnavailable(err.to_string().into())
        }
        _ => {
            tracing::warn!(%err, "sig-store: constraint violation");
            RepositoryError::ConstraintViolation(err.to_string().into())
        }
    }
}

/// A Postgres connection pool, implementing [`SessionRepository`] against
/// the `sessions` table created by `migrations/0001_sessions.sql`.
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Connect to `database_url` with a bounded pool, then run pending
    /// migrations. Fails fast on a malformed URL or an unreachable server —
    /// deployments are expected to treat this as fatal at startup.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an already-constructed pool without running migrations again,
    /// for callers (tests, `xtask`) that manage migration state themselves.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(
        &self,
        encrypted_file_name: String,
        file_size: u64,
        encrypted_file_type: String,
        code_hash: Option<String>,
        file_hash: Option<String>,
    ) -> RepoResult<String> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO sessions (id, encrypted_file_name, encrypted_file_type, file_size, file_hash, code_hash, status) \
             VALUES ($1, $2, $3, $4, $5, $6, 'WAITING')",
        )
        .bind(id)
        .bind(&encrypted_file_name)
        .bind(&encrypted_file_type)
        .bind(file_size as i64)
        .bind(&file_hash)
        .bind(&code_hash)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(id.to_string())
    }

    async fn find(&self, id: &str) -> RepoResult<Option<Session>> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let row = sqlx::query(
            "SELECT id, encrypted_file_name, encrypted_file_type, file_size, file_hash, code_hash, status, created_at \
             FROM sessions WHERE id = $1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status").map_err(map_sqlx_err)?;
        let file_size: i64 = row.try_get("file_size").map_err(map_sqlx_err)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx_err)?;

        Ok(Some(Session {
            id: row.try_get::<Uuid, _>("id").map_err(map_sqlx_err)?.to_string(),
            encrypted_file_name: row.try_get("encrypted_file_name").map_err(map_sqlx_err)?,
            encrypted_file_type: row.try_get("encrypted_file_type").map_err(map_sqlx_err)?,
            file_size: file_size as u64,
            file_hash: row.try_get("file_hash").map_err(map_sqlx_err)?,
            code_hash: row.try_get("code_hash").map_err(map_sqlx_err)?,
            status: parse_status(&status)?,
            created_at,
        }))
    }

    async fn set_status(&self, id: &str, status: SessionStatus) -> RepoResult<()> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Err(RepositoryError::ConstraintViolation("malformed session id".into()));
        };

        // Idempotent in general; the only forbidden transition is
        // COMPLETED -> ACTIVE (spec.md 4.A).
        let result = sqlx::query(
            "UPDATE sessions SET status = $1 \
             WHERE id = $2 AND NOT (status = 'COMPLETED' AND $1 = 'ACTIVE')",
        )
        .bind(status_str(status))
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::ConstraintViolation(
                "session not found or transition rejected".into(),
            ));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(());
        };
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        status_filter: Option<&[SessionStatus]>,
    ) -> RepoResult<u64> {
        let result = match status_filter {
            Some(statuses) => {
                let names: Vec<&'static str> = statuses.iter().copied().map(status_str).collect();
                sqlx::query("DELETE FROM sessions WHERE created_at < $1 AND status = ANY($2)")
                    .bind(cutoff)
                    .bind(&names)
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query("DELETE FROM sessions WHERE created_at < $1")
                    .bind(cutoff)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}
