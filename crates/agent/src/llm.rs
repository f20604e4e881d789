use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use comanda_core::config::LlmConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiChatClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
}

impl OpenAiChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| anyhow!("llm.api_key is not set"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build llm http client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }
}

fn first_choice_text(response: CompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| anyhow!("llm response contained no message content"))
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&CompletionRequest { model: &self.model, messages })
            .send()
            .await
            .context("llm request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("llm endpoint returned {status}"));
        }

        let body: CompletionResponse =
            response.json().await.context("failed to decode llm response")?;
        first_choice_text(body)
    }
}

#[cfg(test)]
mod tests {
    use comanda_core::config::{LlmConfig, LlmProvider};

    use super::{first_choice_text, ChatMessage, CompletionResponse, OpenAiChatClient};

    fn config(api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: api_key.map(|key| key.to_string().into()),
            base_url: "https://api.openai.com/v1/".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let json = serde_json::to_value(vec![ChatMessage::system("s"), ChatMessage::user("u")])
            .expect("serialize");
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[1]["role"], "user");
        assert_eq!(json[1]["content"], "u");
    }

    #[test]
    fn extracts_first_choice_content() {
        let response: CompletionResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "  ¡Hola!  "}}]}"#,
        )
        .expect("decode");
        assert_eq!(first_choice_text(response).expect("content"), "¡Hola!");
    }

    #[test]
    fn empty_choices_are_an_error() {
        let response: CompletionResponse =
            serde_json::from_str(r#"{"choices": []}"#).expect("decode");
        assert!(first_choice_text(response).is_err());
    }

    #[test]
    fn client_requires_an_api_key() {
        assert!(OpenAiChatClient::from_config(&config(None)).is_err());
        let client = OpenAiChatClient::from_config(&config(Some("sk-test"))).expect("client");
        assert_eq!(client.endpoint, "https://api.openai.com/v1/chat/completions");
    }
}
