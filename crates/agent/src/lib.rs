//! Conversational agent for table-side ordering.
//!
//! The language model only converses and drafts the order summary. Prices,
//! totals, numbering and payment state are decided by the ordering core from
//! the parsed summary, never taken from model output.
//!
//! - **LLM** (`llm`): chat-completions client behind the [`llm::LlmClient`] trait.
//! - **Prompt** (`prompt`): persona, summary template, menu and transcript.
//! - **Runtime** (`runtime`): one reply per customer turn, flagged when it
//!   carries an order summary.

pub mod llm;
pub mod prompt;
pub mod runtime;

pub use llm::{ChatMessage, ChatRole, LlmClient, OpenAiChatClient};
pub use runtime::{AgentReply, AgentRuntime};
