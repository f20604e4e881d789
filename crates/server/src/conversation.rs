//! Per-message conversation pipeline.
//!
//! ```text
//! inbound message
//!   ├─ audio → MediaTranscriber (None → "type it instead")
//!   ├─ close keyword → close session, farewell
//!   ├─ current order failed → same lines as a new order → new link
//!   └─ session → agent reply
//!        ├─ plain reply → transcript + log → send
//!        └─ order summary → parse → table check → ledger → confirmation + link
//! ```
//!
//! Every user-visible failure is paired with a plain-language message on the
//! channel before the error is returned.

use std::sync::Arc;

use comanda_agent::AgentRuntime;
use comanda_core::config::AppConfig;
use comanda_core::domain::order::{Order, OrderNumber, OrderStatus};
use comanda_core::domain::session::{OrderPointer, Session};
use comanda_core::domain::tenant::Tenant;
use comanda_core::errors::ApplicationError;
use comanda_core::order_summary::{parse_order_summary, rewrite_total};
use comanda_core::payment::checkout_link;
use comanda_db::repositories::OrderRepository;
use comanda_whatsapp::templates;
use comanda_whatsapp::{InboundContent, InboundMessage, MediaTranscriber, MessagingChannel};
use tracing::{error, info, warn};

use crate::sessions::SessionManager;

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub close_keyword: String,
    pub public_base_url: String,
    pub payment_method: String,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            close_keyword: config.conversation.close_keyword.clone(),
            public_base_url: config.payment.public_base_url.clone(),
            payment_method: config.payment.method_name.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Replied,
    OrderPlaced(OrderNumber),
    /// The previous order's payment failed; its lines were placed again
    /// under a new number.
    OrderReissued { previous: OrderNumber, order_number: OrderNumber },
    /// The agent produced a summary that could not become an order.
    OrderRejected,
    SessionClosed,
    /// Content the deployment cannot handle, such as voice notes without a
    /// transcriber.
    Unsupported,
}

struct Reply {
    text: String,
    current_order: Option<OrderPointer>,
    outcome: TurnOutcome,
}

impl Reply {
    fn rejected(text: String) -> Self {
        Self { text, current_order: None, outcome: TurnOutcome::OrderRejected }
    }
}

pub struct ConversationPipeline {
    sessions: SessionManager,
    orders: Arc<dyn OrderRepository>,
    agent: AgentRuntime,
    channel: Arc<dyn MessagingChannel>,
    transcriber: Arc<dyn MediaTranscriber>,
    settings: PipelineSettings,
}

impl ConversationPipeline {
    pub fn new(
        sessions: SessionManager,
        orders: Arc<dyn OrderRepository>,
        agent: AgentRuntime,
        channel: Arc<dyn MessagingChannel>,
        transcriber: Arc<dyn MediaTranscriber>,
        settings: PipelineSettings,
    ) -> Self {
        Self { sessions, orders, agent, channel, transcriber, settings }
    }

    pub async fn handle(
        &self,
        tenant: &Tenant,
        message: &InboundMessage,
    ) -> Result<TurnOutcome, ApplicationError> {
        let Some(text) = self.message_text(tenant, message).await? else {
            return Ok(TurnOutcome::Unsupported);
        };

        if is_close_keyword(&text, &self.settings.close_keyword) {
            self.sessions.close(&message.from, tenant.id).await?;
            self.send(tenant, &message.from, templates::FAREWELL).await?;
            return Ok(TurnOutcome::SessionClosed);
        }

        let session = self.sessions.get_or_create(tenant.id, &message.from).await?;
        if let Some(reply) = self.reissue_failed_order(tenant, &session).await? {
            self.sessions.record_turn(&session, &text, &reply.text, reply.current_order).await?;
            self.send(tenant, &message.from, &reply.text).await?;
            return Ok(reply.outcome);
        }

        let agent_reply = match self.agent.reply(tenant, &session.context, &text).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "agent.reply.failed",
                    tenant_id = %tenant.id,
                    message_id = %message.message_id,
                    error = %error,
                    "agent did not produce a reply"
                );
                self.send(tenant, &message.from, &templates::assistant_unavailable()).await?;
                return Err(ApplicationError::Gateway(format!("agent reply failed: {error}")));
            }
        };

        let reply = if agent_reply.is_order_summary {
            self.place_order(tenant, &message.from, &agent_reply.text).await?
        } else {
            Reply { text: agent_reply.text, current_order: None, outcome: TurnOutcome::Replied }
        };

        self.sessions.record_turn(&session, &text, &reply.text, reply.current_order).await?;
        self.send(tenant, &message.from, &reply.text).await?;
        Ok(reply.outcome)
    }

    async fn message_text(
        &self,
        tenant: &Tenant,
        message: &InboundMessage,
    ) -> Result<Option<String>, ApplicationError> {
        let media_id = match &message.content {
            InboundContent::Text(text) => return Ok(Some(text.clone())),
            InboundContent::Audio { media_id } => media_id,
        };

        match self.transcriber.transcribe(tenant, media_id).await {
            Ok(Some(text)) => Ok(Some(text)),
            Ok(None) => {
                self.send(tenant, &message.from, &templates::voice_not_supported()).await?;
                Ok(None)
            }
            Err(error) => {
                warn!(
                    event_name = "whatsapp.media.transcription_failed",
                    tenant_id = %tenant.id,
                    message_id = %message.message_id,
                    error = %error,
                    "voice note could not be transcribed"
                );
                self.send(tenant, &message.from, &templates::voice_not_supported()).await?;
                Err(error.into())
            }
        }
    }

    async fn place_order(
        &self,
        tenant: &Tenant,
        customer: &str,
        summary: &str,
    ) -> Result<Reply, ApplicationError> {
        let parsed = match parse_order_summary(summary) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(
                    event_name = "order.summary.unparsed",
                    tenant_id = %tenant.id,
                    error = %error,
                    "agent summary had no recognisable line items"
                );
                return Ok(Reply::rejected(templates::order_not_understood()));
            }
        };

        if let Some(table_number) = parsed.table_number {
            if !tenant.accepts_table(table_number) {
                warn!(
                    event_name = "order.summary.table_out_of_range",
                    tenant_id = %tenant.id,
                    table_number,
                    "summary names a table the tenant does not have"
                );
                return Ok(Reply::rejected(templates::table_out_of_range(
                    tenant.table_number_min,
                    tenant.table_number_max,
                )));
            }
        }

        let new_order = parsed.into_new_order(tenant.id, customer, &self.settings.payment_method);
        let order = match self.orders.create_order(new_order).await {
            Ok(order) => order,
            Err(error) => {
                error!(
                    event_name = "order.create.failed",
                    tenant_id = %tenant.id,
                    error = %error,
                    "order could not be registered"
                );
                return Ok(Reply::rejected(templates::order_not_registered()));
            }
        };

        let link = self.link_for(tenant, &order)?;

        info!(
            event_name = "order.created",
            tenant_id = %tenant.id,
            order_number = %order.order_number,
            total = %order.total,
            items = order.items.len(),
            "order registered from agent summary"
        );

        let text =
            format!("{}\n\n{}", rewrite_total(summary, order.total), templates::payment_link(&link));
        let current_order =
            Some(OrderPointer { order_id: order.id, order_number: order.order_number.clone() });
        Ok(Reply { text, current_order, outcome: TurnOutcome::OrderPlaced(order.order_number) })
    }

    /// Re-places the order the session points at when its payment failed.
    /// Any later message from the customer counts as asking for a new link.
    async fn reissue_failed_order(
        &self,
        tenant: &Tenant,
        session: &Session,
    ) -> Result<Option<Reply>, ApplicationError> {
        let Some(pointer) = &session.context.current_order else {
            return Ok(None);
        };
        let Some(failed) = self.orders.find_by_number(tenant.id, &pointer.order_number).await?
        else {
            return Ok(None);
        };
        if failed.status != OrderStatus::Failed {
            return Ok(None);
        }

        let new_order = failed.reissue(&self.settings.payment_method)?;
        let order = match self.orders.create_order(new_order).await {
            Ok(order) => order,
            Err(error) => {
                error!(
                    event_name = "order.reissue.failed",
                    tenant_id = %tenant.id,
                    previous_order_number = %failed.order_number,
                    error = %error,
                    "failed order could not be placed again"
                );
                return Ok(Some(Reply::rejected(templates::order_not_registered())));
            }
        };
        let link = self.link_for(tenant, &order)?;

        info!(
            event_name = "order.reissued",
            tenant_id = %tenant.id,
            previous_order_number = %failed.order_number,
            order_number = %order.order_number,
            total = %order.total,
            "failed order placed again with a new payment link"
        );

        let text =
            templates::payment_link_reissued(&failed.order_number, &order.order_number, &link);
        let current_order =
            Some(OrderPointer { order_id: order.id, order_number: order.order_number.clone() });
        Ok(Some(Reply {
            text,
            current_order,
            outcome: TurnOutcome::OrderReissued {
                previous: failed.order_number,
                order_number: order.order_number,
            },
        }))
    }

    fn link_for(&self, tenant: &Tenant, order: &Order) -> Result<String, ApplicationError> {
        checkout_link(&self.settings.public_base_url, &order.order_number, order.total, tenant.id)
            .map_err(|error| {
                ApplicationError::Configuration(format!("payment.public_base_url: {error}"))
            })
    }

    async fn send(&self, tenant: &Tenant, to: &str, body: &str) -> Result<(), ApplicationError> {
        self.channel.send_text(tenant, to, body).await.map_err(ApplicationError::from)
    }
}

fn is_close_keyword(text: &str, keyword: &str) -> bool {
    let keyword = keyword.trim();
    !keyword.is_empty() && text.trim().to_lowercase() == keyword.to_lowercase()
}
