//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider takes a conversation plus the operations the model may call and
//! produces one round: a sequence of [`RoundItem`]s that ends with the fully
//! assembled assistant message, a provider error event, or a fault.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::message::{Conversation, Message};
use crate::stream_event::StreamEvent;
use crate::tool::OperationSpec;

/// One round's input.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The model to use (e.g., "claude-3-5-sonnet-latest")
    pub model: String,

    /// The conversation so far
    pub conversation: Conversation,

    /// Operations the model may request
    pub operations: Vec<OperationSpec>,

    /// Maximum tokens to generate; the provider default applies when `None`
    pub max_tokens: Option<u32>,
}

/// One item of a provider round.
#[derive(Debug)]
pub enum RoundItem {
    /// An event to relay to the caller as-is.
    Event(StreamEvent),

    /// The assembled assistant message. Always the last item of a successful round.
    Finished(Message),

    /// A transport or contract fault. Always the last item.
    Fault(Error),
}

/// A model a provider can serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A short identifier for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Models this provider accepts.
    fn models(&self) -> Vec<ModelInfo>;

    /// Whether credentials are configured.
    fn has_api_key(&self) -> bool {
        true
    }

    /// Replace the credentials used for subsequent requests.
    fn set_api_key(&self, _key: &str) -> Result<()> {
        Err(Error::Internal(format!(
            "Provider '{}' does not accept runtime API keys",
            self.name()
        )))
    }

    fn supports_model(&self, model: &str) -> bool {
        self.models().iter().any(|m| m.id == model)
    }

    /// Reject requests that must not reach the network.
    fn validate(&self, request: &CompletionRequest) -> Result<()> {
        if !self.supports_model(&request.model) {
            return Err(Error::UnsupportedModel(request.model.clone()));
        }
        request.conversation.validate_for_round()
    }

    /// Start one streaming round.
    ///
    /// Validation failures and connection failures are returned directly.
    /// Everything that happens after the provider accepted the connection is
    /// delivered through the receiver. Dropping the receiver stops the round.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<RoundItem>>;

    /// Single-shot text completion built on top of `stream_completion`.
    async fn complete_text(&self, model: &str, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = CompletionRequest {
            model: model.to_string(),
            conversation: Conversation::from(vec![Message::user(prompt)]),
            operations: Vec::new(),
            max_tokens: Some(max_tokens),
        };

        let mut rx = self.stream_completion(request).await?;
        while let Some(item) = rx.recv().await {
            match item {
                RoundItem::Event(StreamEvent::ProviderError(info)) => {
                    return Err(Error::Provider(info));
                }
                RoundItem::Event(_) => {}
                RoundItem::Finished(message) => return Ok(message.text()),
                RoundItem::Fault(err) => return Err(err),
            }
        }

        Err(Error::ProviderTransport(
            "stream ended without a final message".into(),
        ))
    }
}
