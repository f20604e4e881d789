use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::TenantId;

/// Markers older than this are garbage-collected by the periodic sweep.
pub const DEFAULT_RETENTION_HOURS: u32 = 24;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub message_id: MessageId,
    pub tenant_id: TenantId,
    pub created_at: DateTime<Utc>,
}

pub fn retention_cutoff(now: DateTime<Utc>, retention_hours: u32) -> DateTime<Utc> {
    now - Duration::hours(i64::from(retention_hours))
}
