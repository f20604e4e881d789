use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::tenant::TenantId;
use crate::errors::DomainError;

/// Width of the rendered tenant-scoped order number.
pub const ORDER_NUMBER_WIDTH: usize = 12;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl PaymentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Tenant-scoped, fixed-width decimal order number (`000000000042`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn from_sequence(value: u64) -> Self {
        Self(format!("{value:0width$}", width = ORDER_NUMBER_WIDTH))
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn order_status(&self) -> OrderStatus {
        match self {
            Self::Pending => OrderStatus::Pending,
            Self::Paid => OrderStatus::Paid,
            Self::Failed => OrderStatus::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExtra {
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub subtotal: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    /// unit_price x quantity; extras carry their own subtotals.
    pub subtotal: Decimal,
    pub extras: Vec<OrderExtra>,
    pub exclusions: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub order_number: OrderNumber,
    pub table_number: Option<u32>,
    pub customer_reference: String,
    pub status: OrderStatus,
    pub total: Decimal,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the ledger needs to register an order and its pending payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub tenant_id: TenantId,
    pub customer_reference: String,
    pub table_number: Option<u32>,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub payment_method: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub tenant_id: TenantId,
    pub status: PaymentStatus,
    pub method: String,
    pub transaction_reference: Option<String>,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// A fresh pending order carrying the same lines as this failed one. The
    /// failed order stays failed; the copy gets its own number and payment.
    pub fn reissue(&self, payment_method: &str) -> Result<NewOrder, DomainError> {
        if self.status != OrderStatus::Failed {
            return Err(DomainError::InvalidOrderTransition {
                from: self.status,
                to: OrderStatus::Pending,
            });
        }

        Ok(NewOrder {
            tenant_id: self.tenant_id,
            customer_reference: self.customer_reference.clone(),
            table_number: self.table_number,
            items: self.items.clone(),
            total: self.total,
            payment_method: payment_method.to_string(),
        })
    }
}

/// Rounds a currency amount to cents, halves away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Amount in minor units (cents), as gateways expect it.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    let cents = round_currency(amount) * Decimal::ONE_HUNDRED;
    i64::try_from(cents.trunc()).ok()
}
