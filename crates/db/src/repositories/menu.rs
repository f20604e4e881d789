use std::collections::HashMap;

use sqlx::Row;

use comanda_core::domain::menu::{MenuCategory, MenuExtra, MenuItem, MenuSnapshot};
use comanda_core::domain::tenant::TenantId;
use sqlx::{Sqlite, Transaction};

use super::{parse_decimal, MenuRepository, MenuUpsert, RepositoryError};
use crate::DbPool;

pub struct SqlMenuRepository {
    pool: DbPool,
}

impl SqlMenuRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn sort_position(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

/// Returns the category id and whether it was inserted.
async fn upsert_category(
    tx: &mut Transaction<'_, Sqlite>,
    tenant_id: TenantId,
    category: &MenuCategory,
    sort_order: i64,
) -> Result<(i64, bool), RepositoryError> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM menu_category WHERE tenant_id = ? AND name = ?")
            .bind(tenant_id.0)
            .bind(&category.name)
            .fetch_optional(&mut **tx)
            .await?;

    if let Some(id) = existing {
        sqlx::query("UPDATE menu_category SET sort_order = ? WHERE id = ?")
            .bind(sort_order)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        return Ok((id, false));
    }

    let id = sqlx::query_scalar(
        "INSERT INTO menu_category (tenant_id, name, sort_order) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(tenant_id.0)
    .bind(&category.name)
    .bind(sort_order)
    .fetch_one(&mut **tx)
    .await?;
    Ok((id, true))
}

async fn upsert_item(
    tx: &mut Transaction<'_, Sqlite>,
    tenant_id: TenantId,
    category_id: i64,
    item: &MenuItem,
    sort_order: i64,
) -> Result<(i64, bool), RepositoryError> {
    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM menu_item WHERE tenant_id = ? AND category_id = ? AND name = ?",
    )
    .bind(tenant_id.0)
    .bind(category_id)
    .bind(&item.name)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(id) = existing {
        sqlx::query(
            "UPDATE menu_item SET ingredients = ?, price = ?, available = ?, sort_order = ?
             WHERE id = ?",
        )
        .bind(&item.ingredients)
        .bind(item.price.to_string())
        .bind(item.available)
        .bind(sort_order)
        .bind(id)
        .execute(&mut **tx)
        .await?;
        return Ok((id, false));
    }

    let id = sqlx::query_scalar(
        "INSERT INTO menu_item
             (tenant_id, category_id, name, ingredients, price, available, sort_order)
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(tenant_id.0)
    .bind(category_id)
    .bind(&item.name)
    .bind(&item.ingredients)
    .bind(item.price.to_string())
    .bind(item.available)
    .bind(sort_order)
    .fetch_one(&mut **tx)
    .await?;
    Ok((id, true))
}

/// Returns whether the extra was inserted.
async fn upsert_extra(
    tx: &mut Transaction<'_, Sqlite>,
    tenant_id: TenantId,
    item_id: i64,
    extra: &MenuExtra,
) -> Result<bool, RepositoryError> {
    let updated = sqlx::query(
        "UPDATE menu_extra SET price = ?, available = ?
         WHERE tenant_id = ? AND menu_item_id = ? AND name = ?",
    )
    .bind(extra.price.to_string())
    .bind(extra.available)
    .bind(tenant_id.0)
    .bind(item_id)
    .bind(&extra.name)
    .execute(&mut **tx)
    .await?;
    if updated.rows_affected() > 0 {
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO menu_extra (tenant_id, menu_item_id, name, price, available)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(tenant_id.0)
    .bind(item_id)
    .bind(&extra.name)
    .bind(extra.price.to_string())
    .bind(extra.available)
    .execute(&mut **tx)
    .await?;
    Ok(true)
}

#[async_trait::async_trait]
impl MenuRepository for SqlMenuRepository {
    async fn snapshot(&self, tenant_id: TenantId) -> Result<MenuSnapshot, RepositoryError> {
        let category_rows = sqlx::query(
            "SELECT id, name FROM menu_category
             WHERE tenant_id = ?
             ORDER BY sort_order ASC, id ASC",
        )
        .bind(tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        let item_rows = sqlx::query(
            "SELECT id, category_id, name, ingredients, price, available FROM menu_item
             WHERE tenant_id = ?
             ORDER BY sort_order ASC, id ASC",
        )
        .bind(tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        let extra_rows = sqlx::query(
            "SELECT menu_item_id, name, price, available FROM menu_extra
             WHERE tenant_id = ?
             ORDER BY id ASC",
        )
        .bind(tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut extras_by_item: HashMap<i64, Vec<MenuExtra>> = HashMap::new();
        for row in &extra_rows {
            let item_id: i64 =
                row.try_get("menu_item_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let name: String =
                row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let price: String =
                row.try_get("price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let available: bool =
                row.try_get("available").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            extras_by_item.entry(item_id).or_default().push(MenuExtra {
                name,
                price: parse_decimal("menu_extra.price", price)?,
                available,
            });
        }

        let mut items_by_category: HashMap<i64, Vec<MenuItem>> = HashMap::new();
        for row in &item_rows {
            let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let category_id: i64 =
                row.try_get("category_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let name: String =
                row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let ingredients: Option<String> =
                row.try_get("ingredients").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let price: String =
                row.try_get("price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let available: bool =
                row.try_get("available").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            items_by_category.entry(category_id).or_default().push(MenuItem {
                name,
                ingredients,
                price: parse_decimal("menu_item.price", price)?,
                available,
                extras: extras_by_item.remove(&id).unwrap_or_default(),
            });
        }

        let mut categories = Vec::with_capacity(category_rows.len());
        for row in &category_rows {
            let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            let name: String =
                row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
            categories
                .push(MenuCategory { name, items: items_by_category.remove(&id).unwrap_or_default() });
        }

        Ok(MenuSnapshot(categories))
    }

    async fn upsert(
        &self,
        tenant_id: TenantId,
        menu: &MenuSnapshot,
    ) -> Result<MenuUpsert, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut summary = MenuUpsert::default();

        for (category_index, category) in menu.0.iter().enumerate() {
            let (category_id, created) =
                upsert_category(&mut tx, tenant_id, category, sort_position(category_index))
                    .await?;
            summary.categories_created += u64::from(created);

            for (item_index, item) in category.items.iter().enumerate() {
                let (item_id, created) =
                    upsert_item(&mut tx, tenant_id, category_id, item, sort_position(item_index))
                        .await?;
                summary.items_created += u64::from(created);

                for extra in &item.extras {
                    let created = upsert_extra(&mut tx, tenant_id, item_id, extra).await?;
                    summary.extras_created += u64::from(created);
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(
            event_name = "db.menu.upserted",
            tenant_id = %tenant_id,
            categories_created = summary.categories_created,
            items_created = summary.items_created,
            extras_created = summary.extras_created,
            "menu merged into catalog"
        );
        Ok(summary)
    }
}
