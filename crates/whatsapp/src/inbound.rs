use serde::Deserialize;

/// `POST /webhook` body as delivered by Meta. Unknown fields are ignored and
/// every collection defaults to empty, so status-only callbacks decode too.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<ChangeMetadata>,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChangeMetadata {
    #[serde(default)]
    pub display_phone_number: Option<String>,
    #[serde(default)]
    pub phone_number_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub audio: Option<MediaRef>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MediaRef {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundContent {
    Text(String),
    Audio { media_id: String },
}

/// One customer message, addressed to a tenant by its business number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub routing_number: String,
    pub sender_id: Option<String>,
    pub from: String,
    pub message_id: String,
    pub content: InboundContent,
}

/// Flattens a delivery into customer messages, in delivery order.
///
/// Changes without a destination number are skipped, as are messages missing
/// an id or sender and message kinds other than text and audio.
pub fn flatten(payload: &WebhookPayload) -> Vec<InboundMessage> {
    let mut messages = Vec::new();

    for change in payload.entry.iter().flat_map(|entry| entry.changes.iter()) {
        let metadata = change.value.metadata.as_ref();
        let Some(routing_number) = metadata
            .and_then(|metadata| metadata.display_phone_number.as_deref())
            .map(str::trim)
            .filter(|number| !number.is_empty())
        else {
            continue;
        };
        let sender_id = metadata.and_then(|metadata| metadata.phone_number_id.clone());

        for raw in &change.value.messages {
            let (Some(message_id), Some(from)) = (raw.id.as_deref(), raw.from.as_deref()) else {
                continue;
            };
            let Some(content) = content_of(raw) else {
                continue;
            };

            messages.push(InboundMessage {
                routing_number: routing_number.to_string(),
                sender_id: sender_id.clone(),
                from: from.to_string(),
                message_id: message_id.to_string(),
                content,
            });
        }
    }

    messages
}

fn content_of(raw: &RawMessage) -> Option<InboundContent> {
    if let Some(text) = &raw.text {
        return Some(InboundContent::Text(text.body.trim().to_string()));
    }
    if let Some(audio) = &raw.audio {
        let media_id = audio.id.as_deref().map(str::trim).filter(|id| !id.is_empty())?;
        return Some(InboundContent::Audio { media_id: media_id.to_string() });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{flatten, InboundContent, WebhookPayload};

    fn payload(json: &str) -> WebhookPayload {
        serde_json::from_str(json).expect("decode payload")
    }

    #[test]
    fn flattens_text_and_audio_messages_across_changes() {
        let payload = payload(
            r#"{
                "object": "whatsapp_business_account",
                "entry": [{
                    "id": "1",
                    "changes": [{
                        "field": "messages",
                        "value": {
                            "metadata": {"display_phone_number": "15551750561", "phone_number_id": "5550001"},
                            "messages": [
                                {"id": "wamid.1", "from": "34600000000", "type": "text", "text": {"body": "  Hola  "}},
                                {"id": "wamid.2", "from": "34600000000", "type": "audio", "audio": {"id": "media-9"}}
                            ]
                        }
                    }]
                }]
            }"#,
        );

        let messages = flatten(&payload);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].routing_number, "15551750561");
        assert_eq!(messages[0].sender_id.as_deref(), Some("5550001"));
        assert_eq!(messages[0].content, InboundContent::Text("Hola".to_string()));
        assert_eq!(messages[1].message_id, "wamid.2");
        assert_eq!(
            messages[1].content,
            InboundContent::Audio { media_id: "media-9".to_string() }
        );
    }

    #[test]
    fn skips_changes_without_destination_number() {
        let payload = payload(
            r#"{"entry": [{"changes": [
                {"value": {"messages": [{"id": "wamid.1", "from": "346", "text": {"body": "hola"}}]}},
                {"value": {"metadata": {"display_phone_number": " "}, "messages": [{"id": "wamid.2", "from": "346", "text": {"body": "hola"}}]}}
            ]}]}"#,
        );

        assert!(flatten(&payload).is_empty());
    }

    #[test]
    fn ignores_unsupported_and_incomplete_messages() {
        let payload = payload(
            r#"{"entry": [{"changes": [{"value": {
                "metadata": {"display_phone_number": "15551750561"},
                "messages": [
                    {"id": "wamid.1", "from": "346", "type": "image", "image": {"id": "img"}},
                    {"id": "wamid.2", "from": "346", "type": "audio", "audio": {}},
                    {"from": "346", "text": {"body": "sin id"}},
                    {"id": "wamid.4", "from": "346", "text": {"body": "ok"}}
                ]
            }}]}]}"#,
        );

        let messages = flatten(&payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, "wamid.4");
    }

    #[test]
    fn status_only_delivery_decodes_to_nothing() {
        let payload = payload(
            r#"{"entry": [{"changes": [{"value": {
                "metadata": {"display_phone_number": "15551750561"},
                "statuses": [{"id": "wamid.1", "status": "delivered"}]
            }}]}]}"#,
        );

        assert!(flatten(&payload).is_empty());
    }
}
