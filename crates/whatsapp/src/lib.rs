//! WhatsApp Cloud API edge.
//!
//! - **Inbound** (`inbound`): webhook payload model, flattened into one
//!   [`inbound::InboundMessage`] per customer message.
//! - **Channel** (`channel`): the [`channel::MessagingChannel`] send trait and
//!   the Graph API client.
//! - **Media** (`media`): voice-note transcription seam.
//! - **Templates** (`templates`): the fixed customer-facing notices.
//!
//! ```text
//! Meta webhook → inbound::flatten → server pipeline → MessagingChannel::send_text
//! ```

pub mod channel;
pub mod inbound;
pub mod media;
pub mod templates;

pub use channel::{ChannelError, MessagingChannel, WhatsAppCloudClient};
pub use inbound::{flatten, InboundContent, InboundMessage, WebhookPayload};
pub use media::{MediaTranscriber, NoopTranscriber};
