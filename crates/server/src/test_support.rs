//! Shared fixtures for the server tests: in-memory ledger, fake channel and
//! scripted agent.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use comanda_agent::{AgentRuntime, ChatMessage, LlmClient};
use comanda_core::config::{AppConfig, DEFAULT_SUMMARY_TRIGGER};
use comanda_core::domain::tenant::{Tenant, TenantId};
use comanda_core::payment::RedsysGateway;
use comanda_db::{connect_with_settings, migrations, DbPool, Repositories};
use comanda_whatsapp::{ChannelError, MessagingChannel, NoopTranscriber};

use crate::conversation::{ConversationPipeline, PipelineSettings};
use crate::reconciliation::Reconciler;
use crate::sessions::SessionManager;

pub const SANDBOX_KEY: &str = "sq7HjrUOBfKmC576ILgskD5srU870gJ7";

pub const ORDER_SUMMARY: &str = "🍽️ Resumen del Pedido: 🍽️\n\
     Mesa: 5\n\
     - Plato 1: Hamburguesa - 8.50€ x2\n\
     --> Extra: Queso - 1.00€ x1\n\
     - Bebida 1: Coca Cola - 2.00€ x1\n\
     Total: 1.00 EUR";

pub async fn setup_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

/// File-backed pool with several connections so concurrent requests really
/// race. Keep the directory alive for as long as the pool.
pub async fn setup_shared_pool() -> (tempfile::TempDir, DbPool) {
    let directory = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", directory.path().join("comanda.db").display());
    let pool = connect_with_settings(&url, 5, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    (directory, pool)
}

pub async fn insert_tenant(pool: &DbPool, name: &str, phone_number: &str) -> TenantId {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO tenant (name, phone_number, waiter_name, business_name,
                             table_number_min, table_number_max, created_at)
         VALUES (?, ?, 'Juan', 'El Mundo del Campero', 1, 12, ?) RETURNING id",
    )
    .bind(name)
    .bind(phone_number)
    .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
    .fetch_one(pool)
    .await
    .expect("insert tenant");
    TenantId(id)
}

pub async fn insert_menu(pool: &DbPool, tenant_id: TenantId) {
    let category_id: i64 = sqlx::query_scalar(
        "INSERT INTO menu_category (tenant_id, name, sort_order) VALUES (?, 'Platos', 0) RETURNING id",
    )
    .bind(tenant_id.0)
    .fetch_one(pool)
    .await
    .expect("insert category");

    for (name, price, sort_order) in [("Hamburguesa", "8.50", 0), ("Coca Cola", "2.00", 1)] {
        sqlx::query(
            "INSERT INTO menu_item (tenant_id, category_id, name, price, available, sort_order)
             VALUES (?, ?, ?, ?, 1, ?)",
        )
        .bind(tenant_id.0)
        .bind(category_id)
        .bind(name)
        .bind(price)
        .bind(sort_order)
        .execute(pool)
        .await
        .expect("insert item");
    }
}

pub async fn load_tenant(repositories: &Repositories, tenant_id: TenantId) -> Tenant {
    repositories.tenants.find_by_id(tenant_id).await.expect("tenant query").expect("tenant exists")
}

pub fn sandbox_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.payment.secret_key = SANDBOX_KEY.to_string().into();
    config.payment.public_base_url = "https://pedidos.example.com".to_string();
    config
}

pub fn sandbox_gateway() -> RedsysGateway {
    RedsysGateway::from_config(&sandbox_config().payment).expect("sandbox key decodes")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub tenant_id: TenantId,
    pub to: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<SentMessage>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl MessagingChannel for RecordingChannel {
    async fn send_text(&self, tenant: &Tenant, to: &str, body: &str) -> Result<(), ChannelError> {
        self.sent.lock().expect("lock").push(SentMessage {
            tenant_id: tenant.id,
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Replies with a fixed text, or fails when none is scripted.
pub struct ScriptedLlm {
    reply: Option<String>,
    pub calls: Mutex<usize>,
}

impl ScriptedLlm {
    pub fn replying(reply: &str) -> Self {
        Self { reply: Some(reply.to_string()), calls: Mutex::new(0) }
    }

    pub fn offline() -> Self {
        Self { reply: None, calls: Mutex::new(0) }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().expect("lock")
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
        *self.calls.lock().expect("lock") += 1;
        self.reply.clone().ok_or_else(|| anyhow!("llm offline"))
    }
}

pub fn pipeline(
    repositories: &Repositories,
    llm: Arc<ScriptedLlm>,
    channel: Arc<RecordingChannel>,
) -> ConversationPipeline {
    let config = sandbox_config();
    ConversationPipeline::new(
        SessionManager::new(repositories.sessions.clone(), repositories.menus.clone()),
        repositories.orders.clone(),
        AgentRuntime::new(llm, DEFAULT_SUMMARY_TRIGGER),
        channel,
        Arc::new(NoopTranscriber),
        PipelineSettings::from_config(&config),
    )
}

pub fn reconciler(repositories: &Repositories, channel: Arc<RecordingChannel>) -> Reconciler {
    Reconciler::new(
        repositories.tenants.clone(),
        repositories.orders.clone(),
        SessionManager::new(repositories.sessions.clone(), repositories.menus.clone()),
        channel,
    )
}
