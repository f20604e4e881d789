use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WAITER_NAME: &str = "Pepe";
pub const DEFAULT_BUSINESS_NAME: &str = "Template Name";
pub const DEFAULT_TABLE_NUMBER_MIN: u32 = 0;
pub const DEFAULT_TABLE_NUMBER_MAX: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub i64);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TenantId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<i64>().map(Self)
    }
}

/// A restaurant account. Created out-of-band and read-only to the ordering core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Channel number customers write to; resolves inbound events to a tenant.
    pub phone_number: String,
    /// Access token the tenant sends with on the messaging channel.
    pub channel_credential: Option<String>,
    /// Channel-side sender id (the WhatsApp phone number id).
    pub channel_sender_id: Option<String>,
    pub waiter_name: String,
    pub business_name: String,
    pub table_number_min: u32,
    pub table_number_max: u32,
    pub merchant_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn accepts_table(&self, table_number: u32) -> bool {
        (self.table_number_min..=self.table_number_max).contains(&table_number)
    }
}
