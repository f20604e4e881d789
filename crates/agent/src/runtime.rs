use std::sync::Arc;

use anyhow::Result;
use comanda_core::domain::session::SessionContext;
use comanda_core::domain::tenant::Tenant;
use comanda_core::order_summary::is_order_summary;
use tracing::debug;

use crate::llm::{ChatMessage, LlmClient};
use crate::prompt::{build_system_prompt, Persona};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
    /// The reply contains the summary trigger and should go to the parser.
    pub is_order_summary: bool,
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    summary_trigger: String,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, summary_trigger: impl Into<String>) -> Self {
        Self { llm, summary_trigger: summary_trigger.into() }
    }

    pub fn summary_trigger(&self) -> &str {
        &self.summary_trigger
    }

    pub async fn reply(
        &self,
        tenant: &Tenant,
        context: &SessionContext,
        user_message: &str,
    ) -> Result<AgentReply> {
        let system_prompt = build_system_prompt(
            &Persona::from(tenant),
            &self.summary_trigger,
            &context.menu,
            &context.conversation,
        );
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(user_message)];

        let text = self.llm.complete(&messages).await?;
        let is_order_summary = is_order_summary(&text, &self.summary_trigger);
        debug!(
            event_name = "agent.reply.generated",
            tenant_id = %tenant.id,
            is_order_summary,
            "agent produced a reply"
        );

        Ok(AgentReply { text, is_order_summary })
    }
}
