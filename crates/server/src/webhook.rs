//! WhatsApp Cloud webhook.
//!
//! `GET` answers the subscription handshake; `POST` receives deliveries. Each
//! customer message in a delivery is claimed in the idempotency store and then
//! processed as its own task, so one message failing never aborts its siblings.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use comanda_core::domain::message::MessageId;
use comanda_core::errors::ApplicationError;
use comanda_db::repositories::{ProcessedMessageRepository, TenantRepository};
use comanda_whatsapp::{flatten, InboundMessage, WebhookPayload};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::conversation::ConversationPipeline;
use crate::errors::HttpError;

pub const WEBHOOK_PATH: &str = "/api/v1/whatsapp/webhook";

#[derive(Clone)]
pub struct WebhookState {
    verify_token: SecretString,
    tenants: Arc<dyn TenantRepository>,
    processed_messages: Arc<dyn ProcessedMessageRepository>,
    pipeline: Arc<ConversationPipeline>,
}

impl WebhookState {
    pub fn new(
        verify_token: SecretString,
        tenants: Arc<dyn TenantRepository>,
        processed_messages: Arc<dyn ProcessedMessageRepository>,
        pipeline: Arc<ConversationPipeline>,
    ) -> Self {
        Self { verify_token, tenants, processed_messages, pipeline }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Disposition {
    Processed,
    Duplicate,
    UnknownTenant,
    Failed,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct WebhookReceipt {
    pub processed: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl WebhookReceipt {
    fn count(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Processed => self.processed += 1,
            Disposition::Duplicate => self.duplicates += 1,
            Disposition::UnknownTenant => self.rejected += 1,
            Disposition::Failed => self.failed += 1,
        }
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route(WEBHOOK_PATH, get(verify).post(receive)).with_state(state)
}

pub async fn verify(
    State(state): State<WebhookState>,
    Query(query): Query<VerifyQuery>,
) -> (StatusCode, String) {
    let subscribing = query.mode.as_deref() == Some("subscribe");
    let token_matches = query
        .verify_token
        .as_deref()
        .is_some_and(|token| token == state.verify_token.expose_secret());

    match (subscribing && token_matches, query.challenge) {
        (true, Some(challenge)) => {
            info!(event_name = "whatsapp.webhook.verified", "webhook subscription verified");
            (StatusCode::OK, challenge)
        }
        _ => {
            warn!(event_name = "whatsapp.webhook.verify_rejected", "webhook verification failed");
            (StatusCode::FORBIDDEN, "Forbidden".to_string())
        }
    }
}

/// Malformed JSON is rejected by the extractor. A delivery whose messages all
/// address unknown business numbers is a validation failure.
pub async fn receive(
    State(state): State<WebhookState>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<WebhookReceipt>, HttpError> {
    let correlation_id = Uuid::new_v4().to_string();
    let messages = flatten(&payload);

    let mut tasks = JoinSet::new();
    for message in messages {
        tasks.spawn(process_message(state.clone(), message, correlation_id.clone()));
    }

    let mut receipt = WebhookReceipt::default();
    while let Some(joined) = tasks.join_next().await {
        let disposition = joined.unwrap_or_else(|error| {
            error!(
                event_name = "whatsapp.message.panicked",
                correlation_id = %correlation_id,
                error = %error,
                "message task did not complete"
            );
            Disposition::Failed
        });
        receipt.count(disposition);
    }

    info!(
        event_name = "whatsapp.webhook.received",
        correlation_id = %correlation_id,
        processed = receipt.processed,
        duplicates = receipt.duplicates,
        rejected = receipt.rejected,
        failed = receipt.failed,
        "webhook delivery handled"
    );

    let all_rejected =
        receipt.rejected > 0 && receipt.processed + receipt.duplicates + receipt.failed == 0;
    if all_rejected {
        return Err(HttpError::new(
            ApplicationError::Validation("delivery addressed to an unknown tenant".to_string()),
            &correlation_id,
        ));
    }
    Ok(Json(receipt))
}

async fn process_message(
    state: WebhookState,
    message: InboundMessage,
    correlation_id: String,
) -> Disposition {
    let tenant = match state.tenants.find_by_phone_number(&message.routing_number).await {
        Ok(Some(tenant)) => tenant,
        Ok(None) => {
            warn!(
                event_name = "whatsapp.message.unknown_tenant",
                correlation_id = %correlation_id,
                message_id = %message.message_id,
                routing_number = %message.routing_number,
                "no tenant owns this business number"
            );
            return Disposition::UnknownTenant;
        }
        Err(error) => {
            error!(
                event_name = "whatsapp.message.tenant_lookup_failed",
                correlation_id = %correlation_id,
                message_id = %message.message_id,
                error = %error,
                "tenant lookup failed"
            );
            return Disposition::Failed;
        }
    };

    let message_id = MessageId(message.message_id.clone());
    match state.processed_messages.claim(tenant.id, &message_id).await {
        Ok(true) => {}
        Ok(false) => {
            info!(
                event_name = "whatsapp.message.duplicate",
                correlation_id = %correlation_id,
                tenant_id = %tenant.id,
                message_id = %message.message_id,
                "message already processed"
            );
            return Disposition::Duplicate;
        }
        Err(error) => {
            error!(
                event_name = "whatsapp.message.claim_failed",
                correlation_id = %correlation_id,
                tenant_id = %tenant.id,
                message_id = %message.message_id,
                error = %error,
                "idempotency claim failed"
            );
            return Disposition::Failed;
        }
    }

    match state.pipeline.handle(&tenant, &message).await {
        Ok(outcome) => {
            info!(
                event_name = "whatsapp.message.processed",
                correlation_id = %correlation_id,
                tenant_id = %tenant.id,
                message_id = %message.message_id,
                outcome = ?outcome,
                "message processed"
            );
            Disposition::Processed
        }
        Err(error) => {
            error!(
                event_name = "whatsapp.message.failed",
                correlation_id = %correlation_id,
                tenant_id = %tenant.id,
                message_id = %message.message_id,
                error = %error,
                "message processing failed"
            );
            Disposition::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        extract::{Query, State},
        http::{Request, StatusCode},
        Json,
    };
    use comanda_core::domain::message::MessageId;
    use comanda_db::Repositories;
    use comanda_whatsapp::WebhookPayload;
    use tower::ServiceExt;

    use super::{receive, router, verify, VerifyQuery, WebhookReceipt, WebhookState, WEBHOOK_PATH};
    use crate::test_support::{insert_tenant, pipeline, setup_pool, RecordingChannel, ScriptedLlm};

    struct Fixture {
        channel: Arc<RecordingChannel>,
        llm: Arc<ScriptedLlm>,
        state: WebhookState,
    }

    async fn fixture() -> Fixture {
        let pool = setup_pool().await;
        insert_tenant(&pool, "el-campero", "15551750561").await;
        let repositories = Repositories::sql(pool);
        let channel = Arc::new(RecordingChannel::default());
        let llm = Arc::new(ScriptedLlm::replying("¡Hola! ¿En qué mesa estás?"));
        let state = WebhookState::new(
            "verify-me".to_string().into(),
            repositories.tenants.clone(),
            repositories.processed_messages.clone(),
            Arc::new(pipeline(&repositories, llm.clone(), channel.clone())),
        );
        Fixture { channel, llm, state }
    }

    fn delivery(routing_number: &str, message_ids: &[&str]) -> WebhookPayload {
        let messages: Vec<serde_json::Value> = message_ids
            .iter()
            .map(|id| {
                serde_json::json!({
                    "id": id, "from": "34600000000", "type": "text", "text": {"body": "Hola"}
                })
            })
            .collect();
        serde_json::from_value(serde_json::json!({
            "object": "whatsapp_business_account",
            "entry": [{"changes": [{"field": "messages", "value": {
                "metadata": {"display_phone_number": routing_number},
                "messages": messages
            }}]}]
        }))
        .expect("payload")
    }

    fn verify_query(mode: &str, token: &str) -> Query<VerifyQuery> {
        Query(VerifyQuery {
            mode: Some(mode.to_string()),
            verify_token: Some(token.to_string()),
            challenge: Some("1158201444".to_string()),
        })
    }

    #[tokio::test]
    async fn handshake_echoes_the_challenge_only_for_the_configured_token() {
        let fixture = fixture().await;

        let (status, body) =
            verify(State(fixture.state.clone()), verify_query("subscribe", "verify-me")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "1158201444");

        let (status, _) =
            verify(State(fixture.state.clone()), verify_query("subscribe", "wrong")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) =
            verify(State(fixture.state.clone()), verify_query("unsubscribe", "verify-me")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn redelivered_message_is_answered_once() {
        let fixture = fixture().await;

        let Json(first) = receive(
            State(fixture.state.clone()),
            Json(delivery("15551750561", &["wamid.1", "wamid.1"])),
        )
        .await
        .expect("first delivery");
        let Json(second) =
            receive(State(fixture.state.clone()), Json(delivery("15551750561", &["wamid.1"])))
                .await
                .expect("redelivery");

        assert_eq!(first, WebhookReceipt { processed: 1, duplicates: 1, ..Default::default() });
        assert_eq!(second, WebhookReceipt { duplicates: 1, ..Default::default() });
        assert_eq!(fixture.channel.sent().len(), 1);
        assert_eq!(fixture.llm.call_count(), 1);
    }

    #[tokio::test]
    async fn failures_are_isolated_per_message() {
        let pool = setup_pool().await;
        let tenant_id = insert_tenant(&pool, "el-campero", "15551750561").await;
        let repositories = Repositories::sql(pool);
        let channel = Arc::new(RecordingChannel::default());
        let state = WebhookState::new(
            "verify-me".to_string().into(),
            repositories.tenants.clone(),
            repositories.processed_messages.clone(),
            Arc::new(pipeline(&repositories, Arc::new(ScriptedLlm::offline()), channel.clone())),
        );

        let Json(receipt) =
            receive(State(state), Json(delivery("15551750561", &["wamid.1", "wamid.2"])))
                .await
                .expect("delivery accepted");

        assert_eq!(receipt.failed, 2);
        assert_eq!(channel.sent().len(), 2);
        for id in ["wamid.1", "wamid.2"] {
            assert!(repositories
                .processed_messages
                .has_processed(tenant_id, &MessageId(id.to_string()))
                .await
                .expect("query"));
        }
    }

    #[tokio::test]
    async fn unknown_business_numbers_are_rejected() {
        let fixture = fixture().await;

        let error =
            receive(State(fixture.state.clone()), Json(delivery("34999999999", &["wamid.1"])))
                .await
                .expect_err("unknown tenant");

        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert!(fixture.channel.sent().is_empty());
    }

    #[tokio::test]
    async fn router_accepts_deliveries_and_rejects_malformed_json() {
        let fixture = fixture().await;
        let app = router(fixture.state.clone());

        let ok = app
            .clone()
            .oneshot(
                Request::post(WEBHOOK_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"entry":[{"changes":[{"value":{"metadata":{"display_phone_number":"15551750561"},"messages":[{"id":"wamid.9","from":"34600000000","type":"text","text":{"body":"Hola"}}]}}]}]}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(ok.status(), StatusCode::OK);

        let malformed = app
            .oneshot(
                Request::post(WEBHOOK_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert!(malformed.status().is_client_error());
        assert_eq!(fixture.channel.sent().len(), 1);
    }
}
