use chrono::Utc;
use sqlx::Row;

use comanda_core::domain::session::{
    ContextPatch, Session, SessionContext, SessionId, SessionLogEntry,
};
use comanda_core::domain::tenant::TenantId;

use super::{format_timestamp, parse_timestamp, RepositoryError, SessionRepository};
use crate::DbPool;

const SESSION_COLUMNS: &str =
    "id, tenant_id, user_id, context_json, active, created_at, updated_at";

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: i64 =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let context_json: String =
        row.try_get("context_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: bool = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let context: SessionContext = serde_json::from_str(&context_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid context_json for session `{id}`: {error}"))
    })?;

    Ok(Session {
        id: SessionId(id),
        tenant_id: TenantId(tenant_id),
        user_id,
        context,
        active,
        created_at: parse_timestamp("created_at", created_at)?,
        updated_at: parse_timestamp("updated_at", updated_at)?,
    })
}

fn encode<T: serde::Serialize>(key: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Encode(format!("context key `{key}`: {error}")))
}

/// `json_set` path/value pairs for the keys present in `patch`.
fn patch_assignments(patch: &ContextPatch) -> Result<Vec<(&'static str, String)>, RepositoryError> {
    let mut assignments = Vec::new();
    if let Some(menu) = &patch.menu {
        assignments.push(("$.menu", encode("menu", menu)?));
    }
    if let Some(conversation) = &patch.conversation {
        assignments.push(("$.conversation", encode("conversation", conversation)?));
    }
    if let Some(current_order) = &patch.current_order {
        assignments.push(("$.current_order", encode("current_order", current_order)?));
    }
    Ok(assignments)
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn find_active(
        &self,
        tenant_id: TenantId,
        user_id: &str,
    ) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_session
             WHERE tenant_id = ? AND user_id = ? AND active = 1"
        ))
        .bind(tenant_id.0)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn create_active(&self, session: Session) -> Result<Session, RepositoryError> {
        let context_json = encode("context", &session.context)?;

        // The partial unique index turns a concurrent second insert into a no-op.
        let result = sqlx::query(
            "INSERT INTO chat_session (id, tenant_id, user_id, context_json, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, 1, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(&session.id.0)
        .bind(session.tenant_id.0)
        .bind(&session.user_id)
        .bind(&context_json)
        .bind(format_timestamp(session.created_at))
        .bind(format_timestamp(session.updated_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                event_name = "db.session.create_conflict",
                tenant_id = %session.tenant_id,
                "active session already exists, reusing it"
            );
        }

        self.find_active(session.tenant_id, &session.user_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!(
                "no active session for tenant {} after insert",
                session.tenant_id
            ))
        })
    }

    async fn find_by_id(
        &self,
        session_id: &SessionId,
        tenant_id: TenantId,
    ) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_session WHERE id = ? AND tenant_id = ?"
        ))
        .bind(&session_id.0)
        .bind(tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn update_context(
        &self,
        session_id: &SessionId,
        tenant_id: TenantId,
        patch: &ContextPatch,
    ) -> Result<bool, RepositoryError> {
        let assignments = patch_assignments(patch)?;
        if assignments.is_empty() {
            return Ok(self.find_by_id(session_id, tenant_id).await?.is_some());
        }

        // Single statement so concurrent patches to different keys both land.
        let placeholders = vec!["?, json(?)"; assignments.len()].join(", ");
        let sql = format!(
            "UPDATE chat_session
             SET context_json = json_set(context_json, {placeholders}), updated_at = ?
             WHERE id = ? AND tenant_id = ?"
        );

        let mut query = sqlx::query(&sql);
        for (path, value) in &assignments {
            query = query.bind(*path).bind(value);
        }
        let result = query
            .bind(format_timestamp(Utc::now()))
            .bind(&session_id.0)
            .bind(tenant_id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate(
        &self,
        tenant_id: TenantId,
        user_id: &str,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE chat_session SET active = 0, updated_at = ?
             WHERE tenant_id = ? AND user_id = ? AND active = 1",
        )
        .bind(format_timestamp(Utc::now()))
        .bind(tenant_id.0)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn append_log(&self, entry: SessionLogEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO session_log (session_id, tenant_id, user_message, bot_response, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.session_id.0)
        .bind(entry.tenant_id.0)
        .bind(&entry.user_message)
        .bind(&entry.bot_response)
        .bind(format_timestamp(entry.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_log(
        &self,
        session_id: &SessionId,
        tenant_id: TenantId,
    ) -> Result<Vec<SessionLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT session_id, tenant_id, user_message, bot_response, created_at
             FROM session_log
             WHERE session_id = ? AND tenant_id = ?
             ORDER BY id ASC",
        )
        .bind(&session_id.0)
        .bind(tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let session_id: String = row
                    .try_get("session_id")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let tenant_id: i64 =
                    row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let user_message: String = row
                    .try_get("user_message")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let bot_response: Option<String> = row
                    .try_get("bot_response")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let created_at: String =
                    row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

                Ok(SessionLogEntry {
                    session_id: SessionId(session_id),
                    tenant_id: TenantId(tenant_id),
                    user_message,
                    bot_response,
                    created_at: parse_timestamp("created_at", created_at)?,
                })
            })
            .collect()
    }
}
