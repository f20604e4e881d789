use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use comanda_core::domain::menu::MenuSnapshot;
use comanda_core::domain::message::MessageId;
use comanda_core::domain::order::{
    NewOrder, Order, OrderId, OrderNumber, Payment, PaymentStatus,
};
use comanda_core::domain::session::{ContextPatch, Session, SessionId, SessionLogEntry};
use comanda_core::domain::tenant::{Tenant, TenantId};
use comanda_core::errors::ApplicationError;
use comanda_core::reconciliation::Settlement;

use crate::DbPool;

pub mod menu;
pub mod order;
pub mod processed_message;
pub mod session;
pub mod tenant;

pub use menu::SqlMenuRepository;
pub use order::SqlOrderRepository;
pub use processed_message::SqlProcessedMessageRepository;
pub use session::SqlSessionRepository;
pub use tenant::SqlTenantRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        Self::Persistence(error.to_string())
    }
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<Tenant>, RepositoryError>;
    async fn find_by_id(&self, id: TenantId) -> Result<Option<Tenant>, RepositoryError>;
}

/// Rows inserted by a menu upload. Rows matched by name are updated in place
/// and not counted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MenuUpsert {
    pub categories_created: u64,
    pub items_created: u64,
    pub extras_created: u64,
}

#[async_trait]
pub trait MenuRepository: Send + Sync {
    /// Current catalog for a tenant, categories and items in display order.
    async fn snapshot(&self, tenant_id: TenantId) -> Result<MenuSnapshot, RepositoryError>;

    /// Merges `menu` into the tenant's catalog in one transaction. Categories
    /// match by name within the tenant, items by name within their category
    /// and extras by name within their item. Uploading the same menu twice
    /// inserts nothing the second time.
    async fn upsert(
        &self,
        tenant_id: TenantId,
        menu: &MenuSnapshot,
    ) -> Result<MenuUpsert, RepositoryError>;
}

#[async_trait]
pub trait ProcessedMessageRepository: Send + Sync {
    async fn has_processed(
        &self,
        tenant_id: TenantId,
        message_id: &MessageId,
    ) -> Result<bool, RepositoryError>;

    /// Records the marker. Marking an already-marked message is a no-op.
    async fn mark_processed(
        &self,
        tenant_id: TenantId,
        message_id: &MessageId,
    ) -> Result<(), RepositoryError>;

    /// Check-and-mark in one statement. Returns `true` only for the caller
    /// that inserted the marker.
    async fn claim(
        &self,
        tenant_id: TenantId,
        message_id: &MessageId,
    ) -> Result<bool, RepositoryError>;

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_active(
        &self,
        tenant_id: TenantId,
        user_id: &str,
    ) -> Result<Option<Session>, RepositoryError>;

    /// Inserts an active session, or returns the one that won a concurrent
    /// insert for the same (tenant, user).
    async fn create_active(&self, session: Session) -> Result<Session, RepositoryError>;

    async fn find_by_id(
        &self,
        session_id: &SessionId,
        tenant_id: TenantId,
    ) -> Result<Option<Session>, RepositoryError>;

    /// Replaces the top-level context keys carried by `patch`. Returns
    /// `false` when no session matched.
    async fn update_context(
        &self,
        session_id: &SessionId,
        tenant_id: TenantId,
        patch: &ContextPatch,
    ) -> Result<bool, RepositoryError>;

    /// Deactivates the user's active session; returns how many rows changed.
    async fn deactivate(&self, tenant_id: TenantId, user_id: &str)
        -> Result<u64, RepositoryError>;

    async fn append_log(&self, entry: SessionLogEntry) -> Result<(), RepositoryError>;

    async fn list_log(
        &self,
        session_id: &SessionId,
        tenant_id: TenantId,
    ) -> Result<Vec<SessionLogEntry>, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Numbers and inserts the order, its items and a pending payment in one
    /// transaction.
    async fn create_order(&self, new_order: NewOrder) -> Result<Order, RepositoryError>;

    async fn find_by_number(
        &self,
        tenant_id: TenantId,
        order_number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn find_payment(
        &self,
        tenant_id: TenantId,
        order_id: &OrderId,
    ) -> Result<Option<Payment>, RepositoryError>;

    /// Moves a pending order/payment pair to `target`. Only the first caller
    /// observes `Settlement::Applied`.
    async fn settle_payment(
        &self,
        tenant_id: TenantId,
        order_number: &OrderNumber,
        target: PaymentStatus,
        transaction_reference: Option<&str>,
    ) -> Result<Settlement, RepositoryError>;
}

/// SQL-backed implementations sharing one pool.
#[derive(Clone)]
pub struct Repositories {
    pub tenants: std::sync::Arc<dyn TenantRepository>,
    pub menus: std::sync::Arc<dyn MenuRepository>,
    pub processed_messages: std::sync::Arc<dyn ProcessedMessageRepository>,
    pub sessions: std::sync::Arc<dyn SessionRepository>,
    pub orders: std::sync::Arc<dyn OrderRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        use std::sync::Arc;

        Self {
            tenants: Arc::new(SqlTenantRepository::new(pool.clone())),
            menus: Arc::new(SqlMenuRepository::new(pool.clone())),
            processed_messages: Arc::new(SqlProcessedMessageRepository::new(pool.clone())),
            sessions: Arc::new(SqlSessionRepository::new(pool.clone())),
            orders: Arc::new(SqlOrderRepository::new(pool)),
        }
    }
}

// Fixed-width UTC so that text comparison orders timestamps.
pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_optional_u32(
    column: &str,
    value: Option<i64>,
) -> Result<Option<u32>, RepositoryError> {
    value.map(|value| parse_u32(column, value)).transpose()
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}
