use std::sync::Arc;

use comanda_core::domain::order::OrderNumber;
use comanda_core::domain::tenant::TenantId;
use comanda_core::errors::ApplicationError;
use comanda_core::payment::DecodedCallback;
use comanda_core::reconciliation::{target_status, FollowUp, Settlement, UserNotice};
use comanda_db::repositories::{OrderRepository, TenantRepository};
use comanda_whatsapp::{templates, MessagingChannel};
use tracing::{info, warn};

use crate::sessions::SessionManager;

/// Applies verified gateway callbacks to the ledger and runs the follow-ups
/// of the callback that performed the transition.
pub struct Reconciler {
    tenants: Arc<dyn TenantRepository>,
    orders: Arc<dyn OrderRepository>,
    sessions: SessionManager,
    channel: Arc<dyn MessagingChannel>,
}

impl Reconciler {
    pub fn new(
        tenants: Arc<dyn TenantRepository>,
        orders: Arc<dyn OrderRepository>,
        sessions: SessionManager,
        channel: Arc<dyn MessagingChannel>,
    ) -> Self {
        Self { tenants, orders, sessions, channel }
    }

    /// `None` when the outcome leaves the order untouched (cardholder
    /// cancellation).
    pub async fn apply(
        &self,
        callback: &DecodedCallback,
    ) -> Result<Option<Settlement>, ApplicationError> {
        let Some(target) = target_status(callback.outcome) else {
            info!(
                event_name = "payment.notification.cancelled",
                tenant_id = %callback.tenant_id,
                order_number = %callback.order_number,
                response_code = callback.response_code,
                "cardholder cancelled; order left pending"
            );
            return Ok(None);
        };

        let settlement = self
            .orders
            .settle_payment(
                callback.tenant_id,
                &callback.order_number,
                target,
                callback.transaction_reference.as_deref(),
            )
            .await?;

        info!(
            event_name = "payment.notification.settled",
            tenant_id = %callback.tenant_id,
            order_number = %callback.order_number,
            response_code = callback.response_code,
            settlement = ?settlement,
            "payment notification applied"
        );

        // The transition is committed; a redelivery would see `AlreadySettled`
        // and never retry the follow-up, so its failures are logged only.
        let follow_up = settlement.follow_up();
        if follow_up != FollowUp::default() {
            if let Err(error) =
                self.follow_up(callback.tenant_id, &callback.order_number, follow_up).await
            {
                warn!(
                    event_name = "payment.follow_up.failed",
                    tenant_id = %callback.tenant_id,
                    order_number = %callback.order_number,
                    error = %error,
                    "settlement applied but its follow-up did not complete"
                );
            }
        }
        Ok(Some(settlement))
    }

    // A failed notice does not stop the session from closing.
    async fn follow_up(
        &self,
        tenant_id: TenantId,
        order_number: &OrderNumber,
        follow_up: FollowUp,
    ) -> Result<(), ApplicationError> {
        let tenant = self
            .tenants
            .find_by_id(tenant_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("tenant {tenant_id}")))?;
        let order = self
            .orders
            .find_by_number(tenant_id, order_number)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("order {order_number}")))?;

        if let Some(notice) = follow_up.notice {
            let body = match notice {
                UserNotice::PaymentConfirmed => templates::payment_confirmed(order_number),
                UserNotice::PaymentFailed => templates::payment_failed(order_number),
            };
            if let Err(error) =
                self.channel.send_text(&tenant, &order.customer_reference, &body).await
            {
                warn!(
                    event_name = "payment.notice.send_failed",
                    tenant_id = %tenant_id,
                    order_number = %order_number,
                    error = %error,
                    "customer was not told about the payment outcome"
                );
            }
        }

        if follow_up.close_session {
            self.sessions.close(&order.customer_reference, tenant_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use comanda_core::domain::order::{OrderNumber, OrderStatus, PaymentStatus};
    use comanda_core::domain::tenant::TenantId;
    use comanda_core::payment::{DecodedCallback, PaymentOutcome};
    use comanda_core::reconciliation::Settlement;
    use comanda_db::Repositories;
    use comanda_whatsapp::templates;

    use crate::sessions::SessionManager;
    use crate::test_support::{
        insert_tenant, load_tenant, pipeline, reconciler, setup_pool, RecordingChannel,
        ScriptedLlm, ORDER_SUMMARY,
    };

    fn callback(tenant_id: TenantId, response_code: u32) -> DecodedCallback {
        DecodedCallback {
            order_number: OrderNumber::from_sequence(1),
            tenant_id,
            response_code,
            outcome: PaymentOutcome::from_response_code(response_code),
            transaction_reference: Some("AUTH01".to_string()),
        }
    }

    async fn placed_order() -> (Repositories, TenantId) {
        let pool = setup_pool().await;
        let tenant_id = insert_tenant(&pool, "el-campero", "15551750561").await;
        let repositories = Repositories::sql(pool);
        let tenant = load_tenant(&repositories, tenant_id).await;
        let pipeline = pipeline(
            &repositories,
            Arc::new(ScriptedLlm::replying(ORDER_SUMMARY)),
            Arc::new(RecordingChannel::default()),
        );
        let message = comanda_whatsapp::InboundMessage {
            routing_number: "15551750561".to_string(),
            sender_id: None,
            from: "34600000000".to_string(),
            message_id: "wamid.1".to_string(),
            content: comanda_whatsapp::InboundContent::Text("Eso es todo".to_string()),
        };
        pipeline.handle(&tenant, &message).await.expect("order placed");
        (repositories, tenant_id)
    }

    #[tokio::test]
    async fn success_pays_notifies_once_and_closes_the_session() {
        let (repositories, tenant_id) = placed_order().await;
        let channel = Arc::new(RecordingChannel::default());
        let reconciler = reconciler(&repositories, channel.clone());

        let first = reconciler.apply(&callback(tenant_id, 0)).await.expect("apply");
        let second = reconciler.apply(&callback(tenant_id, 0)).await.expect("apply again");

        assert_eq!(first, Some(Settlement::Applied(PaymentStatus::Paid)));
        assert_eq!(second, Some(Settlement::AlreadySettled(PaymentStatus::Paid)));

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "34600000000");
        assert_eq!(sent[0].body, templates::payment_confirmed(&OrderNumber::from_sequence(1)));

        let order = repositories
            .orders
            .find_by_number(tenant_id, &OrderNumber::from_sequence(1))
            .await
            .expect("query")
            .expect("order");
        assert_eq!(order.status, OrderStatus::Paid);
        let payment = repositories
            .orders
            .find_payment(tenant_id, &order.id)
            .await
            .expect("query")
            .expect("payment");
        assert_eq!(payment.transaction_reference.as_deref(), Some("AUTH01"));

        let sessions =
            SessionManager::new(repositories.sessions.clone(), repositories.menus.clone());
        assert!(!sessions.close("34600000000", tenant_id).await.expect("already closed"));
    }

    #[tokio::test]
    async fn failure_notifies_with_a_retry_hint_and_keeps_the_session() {
        let (repositories, tenant_id) = placed_order().await;
        let channel = Arc::new(RecordingChannel::default());
        let reconciler = reconciler(&repositories, channel.clone());

        let settlement = reconciler.apply(&callback(tenant_id, 180)).await.expect("apply");

        assert_eq!(settlement, Some(Settlement::Applied(PaymentStatus::Failed)));
        assert_eq!(
            channel.sent()[0].body,
            templates::payment_failed(&OrderNumber::from_sequence(1))
        );
        assert!(repositories
            .sessions
            .find_active(tenant_id, "34600000000")
            .await
            .expect("query")
            .is_some());
    }

    #[tokio::test]
    async fn cancellation_changes_nothing_and_stays_silent() {
        let (repositories, tenant_id) = placed_order().await;
        let channel = Arc::new(RecordingChannel::default());
        let reconciler = reconciler(&repositories, channel.clone());

        assert_eq!(reconciler.apply(&callback(tenant_id, 9915)).await.expect("apply"), None);

        assert!(channel.sent().is_empty());
        let order = repositories
            .orders
            .find_by_number(tenant_id, &OrderNumber::from_sequence(1))
            .await
            .expect("query")
            .expect("order");
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_orders_are_reported_without_side_effects() {
        let (repositories, tenant_id) = placed_order().await;
        let channel = Arc::new(RecordingChannel::default());
        let reconciler = reconciler(&repositories, channel.clone());
        let mut unknown = callback(tenant_id, 0);
        unknown.order_number = OrderNumber::from_sequence(99);

        assert_eq!(reconciler.apply(&unknown).await.expect("apply"), Some(Settlement::NotFound));
        assert!(channel.sent().is_empty());
    }

    #[tokio::test]
    async fn follow_up_failures_do_not_fail_the_committed_settlement() {
        let pool = setup_pool().await;
        let tenant_id = insert_tenant(&pool, "el-campero", "15551750561").await;
        let repositories = Repositories::sql(pool.clone());
        let tenant = load_tenant(&repositories, tenant_id).await;
        pipeline(
            &repositories,
            Arc::new(ScriptedLlm::replying(ORDER_SUMMARY)),
            Arc::new(RecordingChannel::default()),
        )
        .handle(&tenant, &comanda_whatsapp::InboundMessage {
            routing_number: "15551750561".to_string(),
            sender_id: None,
            from: "34600000000".to_string(),
            message_id: "wamid.1".to_string(),
            content: comanda_whatsapp::InboundContent::Text("Eso es todo".to_string()),
        })
        .await
        .expect("order placed");
        // Closing the session is the last follow-up step; make it fail.
        for table in ["session_log", "chat_session"] {
            sqlx::query(&format!("DROP TABLE {table}"))
                .execute(&pool)
                .await
                .expect("drop session tables");
        }
        let channel = Arc::new(RecordingChannel::default());
        let reconciler = reconciler(&repositories, channel.clone());

        let settlement = reconciler.apply(&callback(tenant_id, 0)).await.expect("apply");

        assert_eq!(settlement, Some(Settlement::Applied(PaymentStatus::Paid)));
        assert_eq!(
            channel.sent()[0].body,
            templates::payment_confirmed(&OrderNumber::from_sequence(1))
        );
        let order = repositories
            .orders
            .find_by_number(tenant_id, &OrderNumber::from_sequence(1))
            .await
            .expect("query")
            .expect("order");
        assert_eq!(order.status, OrderStatus::Paid);
    }
}
