use std::time::Duration;

use async_trait::async_trait;
use comanda_core::config::WhatsAppConfig;
use comanda_core::domain::tenant::Tenant;
use comanda_core::errors::ApplicationError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is not configured for tenant {tenant}: {detail}")]
    NotConfigured { tenant: String, detail: &'static str },
    #[error("channel request failed: {0}")]
    Transport(String),
    #[error("channel rejected message with status {status}")]
    Rejected { status: u16 },
    #[error("media transcription failed: {0}")]
    Media(String),
}

impl From<ChannelError> for ApplicationError {
    fn from(error: ChannelError) -> Self {
        Self::Gateway(error.to_string())
    }
}

/// Outbound half of the messaging channel. Single attempt, no retries.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn send_text(&self, tenant: &Tenant, to: &str, body: &str) -> Result<(), ChannelError>;
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct TextMessageRequest<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextPayload<'a>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct TextPayload<'a> {
    body: &'a str,
}

impl<'a> TextMessageRequest<'a> {
    fn new(to: &'a str, body: &'a str) -> Self {
        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            kind: "text",
            text: TextPayload { body },
        }
    }
}

/// Graph API client. Tenant channel fields take precedence over the
/// deployment-wide sender and token.
pub struct WhatsAppCloudClient {
    client: Client,
    api_base_url: String,
    default_sender_id: Option<String>,
    default_access_token: Option<SecretString>,
}

impl WhatsAppCloudClient {
    pub fn from_config(config: &WhatsAppConfig, timeout: Duration) -> Result<Self, ChannelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ChannelError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            default_sender_id: config.phone_number_id.clone(),
            default_access_token: config.access_token.clone(),
        })
    }

    fn messages_url(&self, tenant: &Tenant) -> Result<String, ChannelError> {
        let sender_id = tenant
            .channel_sender_id
            .as_deref()
            .or(self.default_sender_id.as_deref())
            .ok_or_else(|| ChannelError::NotConfigured {
                tenant: tenant.id.to_string(),
                detail: "no sender phone number id",
            })?;
        Ok(format!("{}/{}/messages", self.api_base_url, sender_id))
    }

    fn access_token<'a>(&'a self, tenant: &'a Tenant) -> Result<&'a str, ChannelError> {
        tenant
            .channel_credential
            .as_deref()
            .or_else(|| self.default_access_token.as_ref().map(|token| token.expose_secret()))
            .ok_or_else(|| ChannelError::NotConfigured {
                tenant: tenant.id.to_string(),
                detail: "no access token",
            })
    }
}

#[async_trait]
impl MessagingChannel for WhatsAppCloudClient {
    async fn send_text(&self, tenant: &Tenant, to: &str, body: &str) -> Result<(), ChannelError> {
        let url = self.messages_url(tenant)?;
        let token = self.access_token(tenant)?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&TextMessageRequest::new(to, body))
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "whatsapp.send.transport_error",
                    tenant_id = %tenant.id,
                    error = %error,
                    "whatsapp send request failed"
                );
                ChannelError::Transport(error.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "whatsapp.send.rejected",
                tenant_id = %tenant.id,
                status = status.as_u16(),
                "whatsapp rejected outbound message"
            );
            return Err(ChannelError::Rejected { status: status.as_u16() });
        }

        debug!(event_name = "whatsapp.send.ok", tenant_id = %tenant.id, "message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use comanda_core::config::WhatsAppConfig;
    use comanda_core::domain::tenant::{Tenant, TenantId};
    use comanda_core::errors::ApplicationError;

    use super::{ChannelError, TextMessageRequest, WhatsAppCloudClient};

    fn config(sender: Option<&str>, token: Option<&str>) -> WhatsAppConfig {
        WhatsAppConfig {
            api_base_url: "https://graph.facebook.com/v22.0/".to_string(),
            phone_number_id: sender.map(str::to_string),
            access_token: token.map(|token| token.to_string().into()),
            verify_token: "verify".to_string().into(),
        }
    }

    fn tenant(sender: Option<&str>, credential: Option<&str>) -> Tenant {
        Tenant {
            id: TenantId(3),
            name: "el-campero".to_string(),
            phone_number: "15551750561".to_string(),
            channel_credential: credential.map(str::to_string),
            channel_sender_id: sender.map(str::to_string),
            waiter_name: "Pepe".to_string(),
            business_name: "El Campero".to_string(),
            table_number_min: 0,
            table_number_max: 10,
            merchant_code: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn text_request_matches_cloud_api_shape() {
        let json = serde_json::to_value(TextMessageRequest::new("34600000000", "Hola"))
            .expect("serialize request");

        assert_eq!(json["messaging_product"], "whatsapp");
        assert_eq!(json["recipient_type"], "individual");
        assert_eq!(json["to"], "34600000000");
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"]["body"], "Hola");
    }

    #[test]
    fn tenant_sender_and_token_override_defaults() {
        let client = WhatsAppCloudClient::from_config(
            &config(Some("default-sender"), Some("default-token")),
            Duration::from_secs(5),
        )
        .expect("client");

        let own = tenant(Some("tenant-sender"), Some("tenant-token"));
        assert_eq!(
            client.messages_url(&own).expect("url"),
            "https://graph.facebook.com/v22.0/tenant-sender/messages"
        );
        assert_eq!(client.access_token(&own).expect("token"), "tenant-token");

        let shared = tenant(None, None);
        assert_eq!(
            client.messages_url(&shared).expect("url"),
            "https://graph.facebook.com/v22.0/default-sender/messages"
        );
        assert_eq!(client.access_token(&shared).expect("token"), "default-token");
    }

    #[test]
    fn missing_sender_or_token_is_a_configuration_gap() {
        let client =
            WhatsAppCloudClient::from_config(&config(None, None), Duration::from_secs(5))
                .expect("client");
        let bare = tenant(None, None);

        assert!(matches!(client.messages_url(&bare), Err(ChannelError::NotConfigured { .. })));
        assert!(matches!(client.access_token(&bare), Err(ChannelError::NotConfigured { .. })));
    }

    #[test]
    fn channel_errors_surface_as_gateway_failures() {
        let error: ApplicationError = ChannelError::Rejected { status: 401 }.into();
        assert!(matches!(error, ApplicationError::Gateway(_)));
    }
}
