//! SQLite implementation of the SessionRepository.
//!
//! The full conversation state is serialized as one JSON snapshot and
//! replaced in a single statement, so a concurrent reader sees either the
//! prior snapshot or the new one, never a mix. A few columns are
//! denormalized for listing without deserializing every snapshot.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{DomainResult, OrchestratorError};
use crate::domain::models::ConversationState;
use crate::domain::ports::SessionRepository;

#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    snapshot: String,
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, state: &ConversationState) -> DomainResult<()> {
        let snapshot = serde_json::to_string(state)?;
        let outcome = state
            .outcome
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO sessions
               (id, query, data_ref, snapshot, outcome, round_count, cumulative_cost, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&state.session_id)
        .bind(&state.query)
        .bind(state.data_ref.as_ref().map(|d| d.identity()))
        .bind(&snapshot)
        .bind(outcome)
        .bind(state.round_count as i64)
        .bind(state.cumulative_cost)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::DatabaseError(format!(
                "session {} already exists",
                state.session_id
            )));
        }
        Ok(())
    }

    async fn get(&self, session_id: &str) -> DomainResult<Option<ConversationState>> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT snapshot FROM sessions WHERE id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| serde_json::from_str(&r.snapshot).map_err(Into::into))
            .transpose()
    }

    async fn save(&self, state: &ConversationState) -> DomainResult<()> {
        let snapshot = serde_json::to_string(state)?;
        let outcome = state
            .outcome
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"UPDATE sessions SET snapshot = ?, outcome = ?, round_count = ?,
               cumulative_cost = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&snapshot)
        .bind(outcome)
        .bind(state.round_count as i64)
        .bind(state.cumulative_cost)
        .bind(state.updated_at.to_rfc3339())
        .bind(&state.session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::SessionNotFound(
                state.session_id.clone(),
            ));
        }
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    async fn list(&self, limit: usize) -> DomainResult<Vec<ConversationState>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT snapshot FROM sessions ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| serde_json::from_str(&r.snapshot).map_err(Into::into))
            .collect()
    }

    async fn exists(&self, session_id: &str) -> DomainResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
