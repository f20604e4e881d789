use std::sync::Arc;
use std::time::Duration;

use comanda_agent::{AgentRuntime, LlmClient, OpenAiChatClient};
use comanda_core::config::{AppConfig, ConfigError, LoadOptions};
use comanda_core::payment::{GatewayError, RedsysGateway};
use comanda_db::{connect_with_config, migrations, DbPool, Repositories};
use comanda_whatsapp::{
    ChannelError, MediaTranscriber, MessagingChannel, NoopTranscriber, WhatsAppCloudClient,
};
use thiserror::Error;
use tracing::info;

use crate::conversation::{ConversationPipeline, PipelineSettings};
use crate::reconciliation::Reconciler;
use crate::sessions::SessionManager;

const CHANNEL_TIMEOUT: Duration = Duration::from_secs(15);

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub repositories: Repositories,
    pub gateway: Arc<RedsysGateway>,
    pub pipeline: Arc<ConversationPipeline>,
    pub reconciler: Arc<Reconciler>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("payment gateway setup failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("messaging channel setup failed: {0}")]
    Channel(#[from] ChannelError),
    #[error("llm client setup failed: {0}")]
    Llm(String),
}

/// Outbound integrations. Production builds them from config; tests swap in
/// fakes.
pub struct Collaborators {
    pub llm: Arc<dyn LlmClient>,
    pub channel: Arc<dyn MessagingChannel>,
    pub transcriber: Arc<dyn MediaTranscriber>,
}

impl Collaborators {
    pub fn from_config(config: &AppConfig) -> Result<Self, BootstrapError> {
        let llm = OpenAiChatClient::from_config(&config.llm)
            .map_err(|error| BootstrapError::Llm(error.to_string()))?;
        let channel = WhatsAppCloudClient::from_config(&config.whatsapp, CHANNEL_TIMEOUT)?;

        Ok(Self {
            llm: Arc::new(llm),
            channel: Arc::new(channel),
            transcriber: Arc::new(NoopTranscriber),
        })
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let collaborators = Collaborators::from_config(&config)?;
    assemble(config, collaborators).await
}

pub async fn assemble(
    config: AppConfig,
    collaborators: Collaborators,
) -> Result<Application, BootstrapError> {
    let gateway = Arc::new(RedsysGateway::from_config(&config.payment)?);

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let repositories = Repositories::sql(db_pool.clone());
    let sessions = SessionManager::new(repositories.sessions.clone(), repositories.menus.clone());

    let pipeline = ConversationPipeline::new(
        sessions.clone(),
        repositories.orders.clone(),
        AgentRuntime::new(collaborators.llm, config.conversation.summary_trigger.clone()),
        collaborators.channel.clone(),
        collaborators.transcriber,
        PipelineSettings::from_config(&config),
    );
    let reconciler = Reconciler::new(
        repositories.tenants.clone(),
        repositories.orders.clone(),
        sessions,
        collaborators.channel,
    );

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        gateway_url = gateway.gateway_url(),
        "application wired"
    );

    Ok(Application {
        config,
        db_pool,
        repositories,
        gateway,
        pipeline: Arc::new(pipeline),
        reconciler: Arc::new(reconciler),
    })
}
