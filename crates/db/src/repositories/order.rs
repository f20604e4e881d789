use chrono::Utc;
use sqlx::Row;

use comanda_core::domain::order::{
    NewOrder, Order, OrderExtra, OrderId, OrderItem, OrderNumber, OrderStatus, Payment, PaymentId,
    PaymentStatus,
};
use comanda_core::domain::tenant::TenantId;
use comanda_core::reconciliation::Settlement;

use super::{
    format_timestamp, parse_decimal, parse_optional_u32, parse_timestamp, parse_u32,
    OrderRepository, RepositoryError,
};
use crate::DbPool;

const ORDER_COLUMNS: &str = "id, tenant_id, order_number, table_number, customer_reference,
    status, total, created_at, updated_at";

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT product_name, unit_price, quantity, subtotal, extras_json, exclusions_json
             FROM order_item
             WHERE order_id = ?
             ORDER BY line_number ASC",
        )
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_item).collect()
    }
}

fn parse_order_status(value: &str) -> Result<OrderStatus, RepositoryError> {
    OrderStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{value}`")))
}

fn parse_payment_status(value: &str) -> Result<PaymentStatus, RepositoryError> {
    PaymentStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown payment status `{value}`")))
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: i64 =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let order_number: String =
        row.try_get("order_number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let table_number: Option<i64> =
        row.try_get("table_number").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_reference: String =
        row.try_get("customer_reference").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let total: String = row.try_get("total").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Order {
        order_number: OrderNumber::parse(&order_number).ok_or_else(|| {
            RepositoryError::Decode(format!("invalid order_number `{order_number}` on `{id}`"))
        })?,
        id: OrderId(id),
        tenant_id: TenantId(tenant_id),
        table_number: parse_optional_u32("table_number", table_number)?,
        customer_reference,
        status: parse_order_status(&status)?,
        total: parse_decimal("total", total)?,
        items: Vec::new(),
        created_at: parse_timestamp("created_at", created_at)?,
        updated_at: parse_timestamp("updated_at", updated_at)?,
    })
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<OrderItem, RepositoryError> {
    let product_name: String =
        row.try_get("product_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit_price: String =
        row.try_get("unit_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let quantity: i64 =
        row.try_get("quantity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let subtotal: String =
        row.try_get("subtotal").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let extras_json: String =
        row.try_get("extras_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let exclusions_json: String =
        row.try_get("exclusions_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let extras: Vec<OrderExtra> = serde_json::from_str(&extras_json)
        .map_err(|error| RepositoryError::Decode(format!("invalid extras_json: {error}")))?;
    let exclusions: Vec<String> = serde_json::from_str(&exclusions_json)
        .map_err(|error| RepositoryError::Decode(format!("invalid exclusions_json: {error}")))?;

    Ok(OrderItem {
        product_name,
        unit_price: parse_decimal("unit_price", unit_price)?,
        quantity: parse_u32("quantity", quantity)?,
        subtotal: parse_decimal("subtotal", subtotal)?,
        extras,
        exclusions,
    })
}

fn row_to_payment(row: &sqlx::sqlite::SqliteRow) -> Result<Payment, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let order_id: String =
        row.try_get("order_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: i64 =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String = row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let method: String = row.try_get("method").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let transaction_reference: Option<String> = row
        .try_get("transaction_reference")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let amount: String = row.try_get("amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Payment {
        id: PaymentId(id),
        order_id: OrderId(order_id),
        tenant_id: TenantId(tenant_id),
        status: parse_payment_status(&status)?,
        method,
        transaction_reference,
        amount: parse_decimal("amount", amount)?,
        created_at: parse_timestamp("created_at", created_at)?,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn create_order(&self, new_order: NewOrder) -> Result<Order, RepositoryError> {
        if new_order.items.is_empty() {
            return Err(RepositoryError::Encode("order has no line items".to_string()));
        }

        let now = Utc::now();
        let timestamp = format_timestamp(now);
        let order_id = OrderId::generate();

        let mut tx = self.pool.begin().await?;

        // Counter bump first so the transaction holds the write lock from the start.
        let sequence: i64 = sqlx::query_scalar(
            "INSERT INTO tenant_order_sequence (tenant_id, last_value) VALUES (?, 1)
             ON CONFLICT(tenant_id) DO UPDATE SET last_value = last_value + 1
             RETURNING last_value",
        )
        .bind(new_order.tenant_id.0)
        .fetch_one(&mut *tx)
        .await?;
        let sequence = u64::try_from(sequence).map_err(|_| {
            RepositoryError::Decode(format!("negative order sequence {sequence}"))
        })?;
        let order_number = OrderNumber::from_sequence(sequence);

        sqlx::query(
            "INSERT INTO customer_order
                (id, tenant_id, order_number, table_number, customer_reference, status, total,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order_id.0)
        .bind(new_order.tenant_id.0)
        .bind(order_number.as_str())
        .bind(new_order.table_number.map(i64::from))
        .bind(&new_order.customer_reference)
        .bind(OrderStatus::Pending.as_str())
        .bind(new_order.total.to_string())
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await?;

        for (index, item) in new_order.items.iter().enumerate() {
            let extras_json = serde_json::to_string(&item.extras)
                .map_err(|error| RepositoryError::Encode(format!("extras: {error}")))?;
            let exclusions_json = serde_json::to_string(&item.exclusions)
                .map_err(|error| RepositoryError::Encode(format!("exclusions: {error}")))?;

            sqlx::query(
                "INSERT INTO order_item
                    (order_id, tenant_id, line_number, product_name, unit_price, quantity,
                     subtotal, extras_json, exclusions_json)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&order_id.0)
            .bind(new_order.tenant_id.0)
            .bind(index as i64 + 1)
            .bind(&item.product_name)
            .bind(item.unit_price.to_string())
            .bind(i64::from(item.quantity))
            .bind(item.subtotal.to_string())
            .bind(extras_json)
            .bind(exclusions_json)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO payment
                (id, order_id, tenant_id, status, method, transaction_reference, amount,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, NULL, ?, ?, ?)",
        )
        .bind(PaymentId::generate().0)
        .bind(&order_id.0)
        .bind(new_order.tenant_id.0)
        .bind(PaymentStatus::Pending.as_str())
        .bind(&new_order.payment_method)
        .bind(new_order.total.to_string())
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            event_name = "db.order.created",
            tenant_id = %new_order.tenant_id,
            order_number = %order_number,
            items = new_order.items.len(),
            total = %new_order.total,
            "order persisted"
        );

        Ok(Order {
            id: order_id,
            tenant_id: new_order.tenant_id,
            order_number,
            table_number: new_order.table_number,
            customer_reference: new_order.customer_reference,
            status: OrderStatus::Pending,
            total: new_order.total,
            items: new_order.items,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_by_number(
        &self,
        tenant_id: TenantId,
        order_number: &OrderNumber,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order WHERE tenant_id = ? AND order_number = ?"
        ))
        .bind(tenant_id.0)
        .bind(order_number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = row_to_order(&row)?;
        order.items = self.load_items(&order.id).await?;
        Ok(Some(order))
    }

    async fn find_payment(
        &self,
        tenant_id: TenantId,
        order_id: &OrderId,
    ) -> Result<Option<Payment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, order_id, tenant_id, status, method, transaction_reference, amount, created_at
             FROM payment WHERE tenant_id = ? AND order_id = ?",
        )
        .bind(tenant_id.0)
        .bind(&order_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_payment).transpose()
    }

    async fn settle_payment(
        &self,
        tenant_id: TenantId,
        order_number: &OrderNumber,
        target: PaymentStatus,
        transaction_reference: Option<&str>,
    ) -> Result<Settlement, RepositoryError> {
        if target == PaymentStatus::Pending {
            return Err(RepositoryError::Encode("cannot settle a payment to pending".to_string()));
        }

        let timestamp = format_timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        // Conditional write first: only the caller that flips `pending` sees a row change.
        let settled_order_id: Option<String> = sqlx::query_scalar(
            "UPDATE payment
             SET status = ?, transaction_reference = COALESCE(?, transaction_reference), updated_at = ?
             WHERE status = 'pending'
               AND tenant_id = ?
               AND order_id = (
                   SELECT id FROM customer_order WHERE tenant_id = ? AND order_number = ?
               )
             RETURNING order_id",
        )
        .bind(target.as_str())
        .bind(transaction_reference)
        .bind(&timestamp)
        .bind(tenant_id.0)
        .bind(tenant_id.0)
        .bind(order_number.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let settlement = match settled_order_id {
            Some(order_id) => {
                sqlx::query(
                    "UPDATE customer_order SET status = ?, updated_at = ?
                     WHERE id = ? AND status = 'pending'",
                )
                .bind(target.order_status().as_str())
                .bind(&timestamp)
                .bind(&order_id)
                .execute(&mut *tx)
                .await?;
                Settlement::Applied(target)
            }
            None => {
                let current: Option<String> = sqlx::query_scalar(
                    "SELECT payment.status FROM payment
                     JOIN customer_order ON customer_order.id = payment.order_id
                     WHERE customer_order.tenant_id = ? AND customer_order.order_number = ?",
                )
                .bind(tenant_id.0)
                .bind(order_number.as_str())
                .fetch_optional(&mut *tx)
                .await?;

                match current {
                    Some(status) => Settlement::AlreadySettled(parse_payment_status(&status)?),
                    None => Settlement::NotFound,
                }
            }
        };

        tx.commit().await?;
        Ok(settlement)
    }
}
