use sqlx::Row;

use comanda_core::domain::tenant::{
    Tenant, TenantId, DEFAULT_BUSINESS_NAME, DEFAULT_TABLE_NUMBER_MAX, DEFAULT_TABLE_NUMBER_MIN,
    DEFAULT_WAITER_NAME,
};

use super::{parse_optional_u32, parse_timestamp, RepositoryError, TenantRepository};
use crate::DbPool;

const TENANT_COLUMNS: &str = "id, name, phone_number, channel_credential, channel_sender_id,
    waiter_name, business_name, table_number_min, table_number_max, merchant_code, created_at";

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

// Null personalization columns fall back to the shared defaults.
fn row_to_tenant(row: &sqlx::sqlite::SqliteRow) -> Result<Tenant, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let phone_number: String =
        row.try_get("phone_number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel_credential: Option<String> =
        row.try_get("channel_credential").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel_sender_id: Option<String> =
        row.try_get("channel_sender_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let waiter_name: Option<String> =
        row.try_get("waiter_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let business_name: Option<String> =
        row.try_get("business_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let table_number_min: Option<i64> =
        row.try_get("table_number_min").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let table_number_max: Option<i64> =
        row.try_get("table_number_max").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let merchant_code: Option<String> =
        row.try_get("merchant_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Tenant {
        id: TenantId(id),
        name,
        phone_number,
        channel_credential: non_blank(channel_credential),
        channel_sender_id: non_blank(channel_sender_id),
        waiter_name: non_blank(waiter_name).unwrap_or_else(|| DEFAULT_WAITER_NAME.to_string()),
        business_name: non_blank(business_name)
            .unwrap_or_else(|| DEFAULT_BUSINESS_NAME.to_string()),
        table_number_min: parse_optional_u32("table_number_min", table_number_min)?
            .unwrap_or(DEFAULT_TABLE_NUMBER_MIN),
        table_number_max: parse_optional_u32("table_number_max", table_number_max)?
            .unwrap_or(DEFAULT_TABLE_NUMBER_MAX),
        merchant_code: non_blank(merchant_code),
        created_at: parse_timestamp("created_at", created_at)?,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[async_trait::async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn find_by_phone_number(
        &self,
        phone_number: &str,
    ) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenant WHERE phone_number = ?"
        ))
        .bind(phone_number.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_tenant).transpose()
    }

    async fn find_by_id(&self, id: TenantId) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenant WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_tenant).transpose()
    }
}
