/// Persistent suspension store
///
/// Each parked session is one row in `suspensions`. The full token is kept
/// as JSON; the lookup columns are duplicated for indexing and inspection.
/// Consuming a token is a guarded `UPDATE ... WHERE status = 'pending'`, so
/// concurrent resumes of the same id have exactly one winner.
use crate::suspension::{now_secs, SuspensionStore, SuspensionToken};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::TypeKey;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Row status of a parked session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionStatus {
    Pending,
    Resumed,
    Abandoned,
}

impl SuspensionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SuspensionStatus::Pending => "pending",
            SuspensionStatus::Resumed => "resumed",
            SuspensionStatus::Abandoned => "abandoned",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SuspensionStatus::Pending),
            "resumed" => Some(SuspensionStatus::Resumed),
            "abandoned" => Some(SuspensionStatus::Abandoned),
            _ => None,
        }
    }
}

/// Why a take did not hand out a token
enum TakeMiss {
    Unknown,
    Resumed,
    Expired,
    /// Pending, but waiting for the contained type
    WrongType(String),
}

/// SQLite-backed [`SuspensionStore`]
#[derive(Clone)]
pub struct SqliteSuspensionStore {
    pool: SqlitePool,
}

fn db_error(err: anyhow::Error) -> EngineError {
    EngineError::Database(format!("{:#}", err))
}

impl SqliteSuspensionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the token as pending, replacing any earlier row for the id
    async fn upsert(&self, token: &SuspensionToken, encoded: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO suspensions
                (correlation_id, session_id, goal, awaiting_action, expected_type,
                 token, status, created_at, expires_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(correlation_id) DO UPDATE SET
                token = excluded.token,
                status = excluded.status,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&token.correlation_id)
        .bind(&token.session_id)
        .bind(token.goal.as_str())
        .bind(&token.awaiting_action)
        .bind(token.expected_type().as_str())
        .bind(encoded)
        .bind(SuspensionStatus::Pending.as_str())
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(now_secs())
        .execute(&self.pool)
        .await
        .context("Failed to save suspension")?;

        Ok(())
    }

    /// Claim a pending row, optionally only when it awaits `expected`
    async fn take_row(
        &self,
        correlation_id: &str,
        expected: Option<&str>,
    ) -> Result<std::result::Result<String, TakeMiss>> {
        let now = now_secs();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let claimed = sqlx::query(
            r#"
            UPDATE suspensions
            SET status = 'resumed', updated_at = ?
            WHERE correlation_id = ? AND status = 'pending' AND expires_at > ?
              AND (? IS NULL OR expected_type = ?)
            "#,
        )
        .bind(now)
        .bind(correlation_id)
        .bind(now)
        .bind(expected)
        .bind(expected)
        .execute(&mut *tx)
        .await
        .context("Failed to claim suspension")?;

        let row = sqlx::query(
            "SELECT token, status, expected_type, expires_at FROM suspensions WHERE correlation_id = ?",
        )
            .bind(correlation_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load suspension")?;

        let result = match row {
            None => Err(TakeMiss::Unknown),
            Some(row) if claimed.rows_affected() == 1 => Ok(row.get::<String, _>("token")),
            Some(row) => {
                let status: String = row.get("status");
                match SuspensionStatus::parse(&status) {
                    Some(SuspensionStatus::Resumed) => Err(TakeMiss::Resumed),
                    Some(SuspensionStatus::Pending) if row.get::<i64, _>("expires_at") > now => {
                        Err(TakeMiss::WrongType(row.get("expected_type")))
                    }
                    Some(SuspensionStatus::Pending) => {
                        // Still pending but the claim missed: it timed out
                        sqlx::query(
                            "UPDATE suspensions SET status = 'abandoned', updated_at = ? WHERE correlation_id = ?",
                        )
                        .bind(now)
                        .bind(correlation_id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to abandon expired suspension")?;
                        Err(TakeMiss::Expired)
                    }
                    Some(SuspensionStatus::Abandoned) | None => Err(TakeMiss::Expired),
                }
            }
        };

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(result)
    }

    async fn pending_rows(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT token FROM suspensions
            WHERE status = 'pending'
            ORDER BY created_at ASC, correlation_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pending suspensions")?;

        Ok(rows.iter().map(|row| row.get("token")).collect())
    }

    async fn abandon_expired(&self) -> Result<u64> {
        let now = now_secs();
        let result = sqlx::query(
            r#"
            UPDATE suspensions
            SET status = 'abandoned', updated_at = ?
            WHERE status = 'pending' AND expires_at <= ?
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to abandon expired suspensions")?;

        Ok(result.rows_affected())
    }

    async fn claim(
        &self,
        correlation_id: &str,
        expected: Option<&TypeKey>,
    ) -> std::result::Result<SuspensionToken, EngineError> {
        let claimed = self
            .take_row(correlation_id, expected.map(TypeKey::as_str))
            .await
            .map_err(db_error)?;

        match claimed {
            Ok(encoded) => Ok(serde_json::from_str(&encoded)?),
            Err(TakeMiss::Unknown) => Err(EngineError::UnknownSuspension(correlation_id.to_string())),
            Err(TakeMiss::Resumed) => Err(EngineError::AlreadyResumed(correlation_id.to_string())),
            Err(TakeMiss::Expired) => {
                Err(EngineError::SuspensionExpired(correlation_id.to_string()))
            }
            Err(TakeMiss::WrongType(awaiting)) => Err(EngineError::TypeMismatch {
                expected: awaiting,
                actual: expected.map(TypeKey::to_string).unwrap_or_default(),
            }),
        }
    }

    /// Status of a row, if one exists
    pub async fn status(&self, correlation_id: &str) -> Result<Option<SuspensionStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM suspensions WHERE correlation_id = ?")
                .bind(correlation_id)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to read suspension status")?;

        Ok(status.as_deref().and_then(SuspensionStatus::parse))
    }
}

#[async_trait]
impl SuspensionStore for SqliteSuspensionStore {
    async fn save(&self, token: SuspensionToken) -> Result<(), EngineError> {
        let encoded = serde_json::to_string(&token)?;
        self.upsert(&token, &encoded).await.map_err(db_error)?;
        debug!(
            "Persisted suspension {} for session {}",
            token.correlation_id, token.session_id
        );
        Ok(())
    }

    async fn take(&self, correlation_id: &str) -> Result<SuspensionToken, EngineError> {
        self.claim(correlation_id, None).await
    }

    async fn take_as(
        &self,
        correlation_id: &str,
        expected: &TypeKey,
    ) -> Result<SuspensionToken, EngineError> {
        self.claim(correlation_id, Some(expected)).await
    }

    async fn restore(&self, token: SuspensionToken) -> Result<(), EngineError> {
        self.save(token).await
    }

    async fn pending(&self) -> Result<Vec<SuspensionToken>, EngineError> {
        self.pending_rows()
            .await
            .map_err(db_error)?
            .iter()
            .map(|encoded| serde_json::from_str(encoded).map_err(EngineError::from))
            .collect()
    }

    async fn purge_expired(&self) -> Result<usize, EngineError> {
        let purged = self.abandon_expired().await.map_err(db_error)?;
        if purged > 0 {
            debug!("Abandoned {} expired suspension(s)", purged);
        }
        Ok(purged as usize)
    }
}
