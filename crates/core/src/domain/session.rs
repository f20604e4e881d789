use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::menu::MenuSnapshot;
use crate::domain::order::{OrderId, OrderNumber};
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub tenant_id: TenantId,
    /// Channel identifier of the customer (the WhatsApp number).
    pub user_id: String,
    pub context: SessionContext,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub bot: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPointer {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default)]
    pub menu: MenuSnapshot,
    #[serde(default)]
    pub conversation: Vec<ConversationTurn>,
    #[serde(default)]
    pub current_order: Option<OrderPointer>,
}

/// Top-level replacement of context fields. A `Some` field replaces the
/// stored value wholesale; nested values are never merged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextPatch {
    pub menu: Option<MenuSnapshot>,
    pub conversation: Option<Vec<ConversationTurn>>,
    pub current_order: Option<Option<OrderPointer>>,
}

impl SessionContext {
    pub fn new(menu: MenuSnapshot) -> Self {
        Self { menu, conversation: Vec::new(), current_order: None }
    }
}

impl ContextPatch {
    pub fn conversation(conversation: Vec<ConversationTurn>) -> Self {
        Self { conversation: Some(conversation), ..Self::default() }
    }

    pub fn with_current_order(mut self, pointer: Option<OrderPointer>) -> Self {
        self.current_order = Some(pointer);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.menu.is_none() && self.conversation.is_none() && self.current_order.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub session_id: SessionId,
    pub tenant_id: TenantId,
    pub user_message: String,
    pub bot_response: Option<String>,
    pub created_at: DateTime<Utc>,
}
