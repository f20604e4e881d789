pub mod config;
pub mod domain;
pub mod errors;
pub mod order_summary;
pub mod payment;
pub mod reconciliation;

pub use domain::menu::{MenuCategory, MenuExtra, MenuItem, MenuSnapshot};
pub use domain::message::{MessageId, ProcessedMessage};
pub use domain::order::{
    NewOrder, Order, OrderExtra, OrderId, OrderItem, OrderNumber, OrderStatus, Payment, PaymentId,
    PaymentStatus,
};
pub use domain::session::{
    ContextPatch, ConversationTurn, OrderPointer, Session, SessionContext, SessionId,
    SessionLogEntry,
};
pub use domain::tenant::{Tenant, TenantId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use order_summary::{OrderSummaryError, ParsedOrder};
pub use payment::{DecodedCallback, GatewayError, PaymentOutcome, RedsysGateway};
pub use reconciliation::{FollowUp, Settlement, UserNotice};
