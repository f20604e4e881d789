use chrono::{DateTime, Utc};

use comanda_core::domain::message::MessageId;
use comanda_core::domain::tenant::TenantId;

use super::{format_timestamp, ProcessedMessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProcessedMessageRepository {
    pool: DbPool,
}

impl SqlProcessedMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert_marker(
        &self,
        tenant_id: TenantId,
        message_id: &MessageId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO processed_message (message_id, tenant_id, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(message_id, tenant_id) DO NOTHING",
        )
        .bind(&message_id.0)
        .bind(tenant_id.0)
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl ProcessedMessageRepository for SqlProcessedMessageRepository {
    async fn has_processed(
        &self,
        tenant_id: TenantId,
        message_id: &MessageId,
    ) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM processed_message WHERE message_id = ? AND tenant_id = ?",
        )
        .bind(&message_id.0)
        .bind(tenant_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn mark_processed(
        &self,
        tenant_id: TenantId,
        message_id: &MessageId,
    ) -> Result<(), RepositoryError> {
        self.insert_marker(tenant_id, message_id).await.map(|_| ())
    }

    async fn claim(
        &self,
        tenant_id: TenantId,
        message_id: &MessageId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.insert_marker(tenant_id, message_id).await? == 1)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM processed_message WHERE created_at < ?")
            .bind(format_timestamp(cutoff))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use comanda_core::domain::message::MessageId;

    use super::SqlProcessedMessageRepository;
    use crate::repositories::test_support::{insert_tenant, setup_pool};
    use crate::repositories::{format_timestamp, ProcessedMessageRepository};

    fn message(id: &str) -> MessageId {
        MessageId(id.to_string())
    }

    #[tokio::test]
    async fn claim_succeeds_once_per_message() {
        let pool = setup_pool().await;
        let tenant = insert_tenant(&pool, "el-campero", "15551750561").await;
        let repo = SqlProcessedMessageRepository::new(pool.clone());

        assert!(!repo.has_processed(tenant, &message("wamid.1")).await.expect("check"));
        assert!(repo.claim(tenant, &message("wamid.1")).await.expect("first claim"));
        assert!(!repo.claim(tenant, &message("wamid.1")).await.expect("second claim"));
        assert!(repo.has_processed(tenant, &message("wamid.1")).await.expect("check"));

        pool.close().await;
    }

    #[tokio::test]
    async fn markers_are_scoped_per_tenant() {
        let pool = setup_pool().await;
        let first = insert_tenant(&pool, "uno", "34910000001").await;
        let second = insert_tenant(&pool, "dos", "34910000002").await;
        let repo = SqlProcessedMessageRepository::new(pool.clone());

        repo.mark_processed(first, &message("wamid.shared")).await.expect("mark");
        repo.mark_processed(first, &message("wamid.shared")).await.expect("mark twice");

        assert!(repo.has_processed(first, &message("wamid.shared")).await.expect("check"));
        assert!(!repo.has_processed(second, &message("wamid.shared")).await.expect("check"));
        assert!(repo.claim(second, &message("wamid.shared")).await.expect("claim"));

        pool.close().await;
    }

    #[tokio::test]
    async fn purge_removes_only_expired_markers() {
        let pool = setup_pool().await;
        let tenant = insert_tenant(&pool, "el-campero", "15551750561").await;
        let repo = SqlProcessedMessageRepository::new(pool.clone());

        sqlx::query(
            "INSERT INTO processed_message (message_id, tenant_id, created_at) VALUES (?, ?, ?)",
        )
        .bind("wamid.old")
        .bind(tenant.0)
        .bind(format_timestamp(Utc::now() - Duration::hours(48)))
        .execute(&pool)
        .await
        .expect("insert stale marker");
        repo.mark_processed(tenant, &message("wamid.new")).await.expect("mark");

        let purged =
            repo.purge_older_than(Utc::now() - Duration::hours(24)).await.expect("purge");

        assert_eq!(purged, 1);
        assert!(!repo.has_processed(tenant, &message("wamid.old")).await.expect("check"));
        assert!(repo.has_processed(tenant, &message("wamid.new")).await.expect("check"));

        pool.close().await;
    }
}
