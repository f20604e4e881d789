use std::sync::Arc;

use chrono::Utc;
use comanda_core::domain::session::{
    ContextPatch, ConversationTurn, OrderPointer, Session, SessionContext, SessionId,
    SessionLogEntry,
};
use comanda_core::domain::tenant::TenantId;
use comanda_core::errors::ApplicationError;
use comanda_db::repositories::{MenuRepository, SessionRepository};
use tracing::info;

/// Conversation state per (tenant, customer).
///
/// `NONE -> ACTIVE` on the first message, `ACTIVE -> ACTIVE` on every turn,
/// `ACTIVE -> CLOSED` on close. A message after closing opens a new session.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<dyn SessionRepository>,
    menus: Arc<dyn MenuRepository>,
}

impl SessionManager {
    pub fn new(sessions: Arc<dyn SessionRepository>, menus: Arc<dyn MenuRepository>) -> Self {
        Self { sessions, menus }
    }

    /// Active session for the customer, or a new one seeded with the current
    /// menu. Concurrent creators converge on the same row.
    pub async fn get_or_create(
        &self,
        tenant_id: TenantId,
        user_id: &str,
    ) -> Result<Session, ApplicationError> {
        if let Some(session) = self.sessions.find_active(tenant_id, user_id).await? {
            return Ok(session);
        }

        let menu = self.menus.snapshot(tenant_id).await?;
        let now = Utc::now();
        let candidate = Session {
            id: SessionId::generate(),
            tenant_id,
            user_id: user_id.to_string(),
            context: SessionContext::new(menu),
            active: true,
            created_at: now,
            updated_at: now,
        };
        let candidate_id = candidate.id.clone();
        let session = self.sessions.create_active(candidate).await?;

        if session.id == candidate_id {
            info!(
                event_name = "session.created",
                tenant_id = %tenant_id,
                session_id = %session.id.0,
                menu_items = session.context.menu.item_count(),
                "opened conversation session"
            );
        }
        Ok(session)
    }

    pub async fn get_context(
        &self,
        session_id: &SessionId,
        tenant_id: TenantId,
    ) -> Result<SessionContext, ApplicationError> {
        self.sessions
            .find_by_id(session_id, tenant_id)
            .await?
            .map(|session| session.context)
            .ok_or_else(|| ApplicationError::NotFound(format!("session {}", session_id.0)))
    }

    /// Replaces the top-level context keys carried by `patch`.
    pub async fn update_context(
        &self,
        session_id: &SessionId,
        tenant_id: TenantId,
        patch: ContextPatch,
    ) -> Result<(), ApplicationError> {
        if patch.is_empty() {
            return Ok(());
        }
        if self.sessions.update_context(session_id, tenant_id, &patch).await? {
            Ok(())
        } else {
            Err(ApplicationError::NotFound(format!("session {}", session_id.0)))
        }
    }

    /// Deactivates the customer's session. Closing twice is a no-op; returns
    /// whether an active session was closed.
    pub async fn close(&self, user_id: &str, tenant_id: TenantId) -> Result<bool, ApplicationError> {
        let closed = self.sessions.deactivate(tenant_id, user_id).await? > 0;
        if closed {
            info!(event_name = "session.closed", tenant_id = %tenant_id, "closed conversation session");
        }
        Ok(closed)
    }

    /// Appends a turn to the transcript, optionally repoints the current
    /// order, and writes the audit log row.
    pub async fn record_turn(
        &self,
        session: &Session,
        user_message: &str,
        bot_response: &str,
        current_order: Option<OrderPointer>,
    ) -> Result<(), ApplicationError> {
        let mut conversation = session.context.conversation.clone();
        conversation.push(ConversationTurn {
            user: user_message.to_string(),
            bot: bot_response.to_string(),
        });

        let mut patch = ContextPatch::conversation(conversation);
        if current_order.is_some() {
            patch = patch.with_current_order(current_order);
        }
        self.update_context(&session.id, session.tenant_id, patch).await?;

        self.sessions
            .append_log(SessionLogEntry {
                session_id: session.id.clone(),
                tenant_id: session.tenant_id,
                user_message: user_message.to_string(),
                bot_response: Some(bot_response.to_string()),
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use comanda_core::domain::order::{OrderId, OrderNumber};
    use comanda_core::domain::session::{ContextPatch, OrderPointer, SessionId};
    use comanda_core::errors::ApplicationError;
    use comanda_db::Repositories;

    use super::SessionManager;
    use crate::test_support::{insert_menu, insert_tenant, setup_pool, setup_shared_pool};

    fn manager(repositories: &Repositories) -> SessionManager {
        SessionManager::new(repositories.sessions.clone(), repositories.menus.clone())
    }

    #[tokio::test]
    async fn first_message_opens_a_session_with_the_menu_snapshot() {
        let pool = setup_pool().await;
        let tenant_id = insert_tenant(&pool, "el-campero", "15551750561").await;
        insert_menu(&pool, tenant_id).await;
        let manager = manager(&Repositories::sql(pool));

        let session = manager.get_or_create(tenant_id, "34600000000").await.expect("create");
        assert!(session.active);
        assert_eq!(session.context.menu.item_count(), 2);
        assert!(session.context.conversation.is_empty());
        assert_eq!(session.context.current_order, None);

        let again = manager.get_or_create(tenant_id, "34600000000").await.expect("reuse");
        assert_eq!(again.id, session.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_messages_share_one_session() {
        let (_directory, pool) = setup_shared_pool().await;
        let tenant_id = insert_tenant(&pool, "el-campero", "15551750561").await;
        insert_menu(&pool, tenant_id).await;
        let manager = manager(&Repositories::sql(pool.clone()));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.get_or_create(tenant_id, "34600000000").await
            }));
        }
        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.expect("task").expect("get or create"));
        }

        assert!(sessions.iter().all(|session| session.id == sessions[0].id));
        assert!(sessions.iter().all(|session| session.context.menu.item_count() == 2));
        let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_session WHERE active = 1")
            .fetch_one(&pool)
            .await
            .expect("count sessions");
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn recorded_turns_extend_the_transcript_and_log() {
        let pool = setup_pool().await;
        let tenant_id = insert_tenant(&pool, "el-campero", "15551750561").await;
        let repositories = Repositories::sql(pool);
        let manager = manager(&repositories);
        let session = manager.get_or_create(tenant_id, "34600000000").await.expect("create");

        let pointer = OrderPointer {
            order_id: OrderId("order-1".to_string()),
            order_number: OrderNumber::from_sequence(1),
        };
        manager.record_turn(&session, "Hola", "¿Qué mesa?", None).await.expect("turn");
        let session = manager.get_or_create(tenant_id, "34600000000").await.expect("reload");
        manager
            .record_turn(&session, "Mesa 4", "Apuntado", Some(pointer.clone()))
            .await
            .expect("turn");

        let context = manager.get_context(&session.id, tenant_id).await.expect("context");
        assert_eq!(context.conversation.len(), 2);
        assert_eq!(context.conversation[1].user, "Mesa 4");
        assert_eq!(context.current_order, Some(pointer));

        let log = repositories.sessions.list_log(&session.id, tenant_id).await.expect("log");
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].bot_response.as_deref(), Some("¿Qué mesa?"));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_the_next_message_starts_fresh() {
        let pool = setup_pool().await;
        let tenant_id = insert_tenant(&pool, "el-campero", "15551750561").await;
        let manager = manager(&Repositories::sql(pool));
        let first = manager.get_or_create(tenant_id, "34600000000").await.expect("create");

        assert!(manager.close("34600000000", tenant_id).await.expect("close"));
        assert!(!manager.close("34600000000", tenant_id).await.expect("close again"));

        let fresh = manager.get_or_create(tenant_id, "34600000000").await.expect("recreate");
        assert_ne!(fresh.id, first.id);
    }

    #[tokio::test]
    async fn unknown_sessions_are_not_found() {
        let pool = setup_pool().await;
        let tenant_id = insert_tenant(&pool, "el-campero", "15551750561").await;
        let manager = manager(&Repositories::sql(pool));
        let missing = SessionId("missing".to_string());

        assert!(matches!(
            manager.get_context(&missing, tenant_id).await,
            Err(ApplicationError::NotFound(_))
        ));
        assert!(matches!(
            manager
                .update_context(&missing, tenant_id, ContextPatch::conversation(Vec::new()))
                .await,
            Err(ApplicationError::NotFound(_))
        ));
    }
}
