//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE, assembled into one assistant message per round
//! - Error responses reclassified into `provider_error` stream events

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use toolchat_core::error::{Error, Result};
use toolchat_core::message::{ContentBlock, Conversation, Message};
use toolchat_core::provider::{CompletionRequest, ModelInfo, Provider, RoundItem};
use toolchat_core::stream_event::{ProviderErrorInfo, StreamEvent};
use toolchat_core::tool::{OperationName, OperationSpec};
use tracing::{debug, trace, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const CHANNEL_CAPACITY: usize = 64;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: RwLock<String>,
    client: reqwest::Client,
    models: Vec<ModelInfo>,
    max_tokens: u32,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: RwLock::new(api_key.into()),
            client: build_client(DEFAULT_TIMEOUT_SECS),
            models: vec![
                ModelInfo {
                    id: "claude-3-5-sonnet-latest".into(),
                    name: "Claude 3.5 Sonnet".into(),
                    description: String::new(),
                },
                ModelInfo {
                    id: "claude-3-5-haiku-latest".into(),
                    name: "Claude 3.5 Haiku".into(),
                    description: String::new(),
                },
            ],
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Build a provider from application config.
    pub fn from_config(config: &toolchat_config::AppConfig) -> Self {
        let models = config
            .provider
            .models
            .iter()
            .map(|m| ModelInfo {
                id: m.id.clone(),
                name: m.name.clone(),
                description: m.description.clone(),
            })
            .collect();

        Self::new(config.api_key.clone().unwrap_or_default())
            .with_base_url(&config.provider.base_url)
            .with_timeout(config.provider.request_timeout_secs)
            .with_models(models)
            .with_max_tokens(config.max_tokens)
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.client = build_client(secs);
        self
    }

    pub fn with_models(mut self, models: Vec<ModelInfo>) -> Self {
        self.models = models;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn current_key(&self) -> String {
        self.api_key
            .read()
            .map(|k| k.clone())
            .unwrap_or_default()
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
            "messages": to_api_messages(&request.conversation),
            "stream": true,
        });

        if !request.operations.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(&request.operations));
        }

        body
    }
}

fn build_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }

    fn has_api_key(&self) -> bool {
        !self.current_key().is_empty()
    }

    fn set_api_key(&self, key: &str) -> Result<()> {
        let mut guard = self
            .api_key
            .write()
            .map_err(|_| Error::Internal("API key lock poisoned".into()))?;
        *guard = key.trim().to_string();
        Ok(())
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<RoundItem>> {
        self.validate(&request)?;

        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(&request);

        debug!(
            provider = "anthropic",
            model = %request.model,
            messages = request.conversation.len(),
            operations = request.operations.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.current_key())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ProviderTransport(e.to_string()))?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let status = response.status().as_u16();

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            let info = ProviderErrorInfo::from_status(status, &error_body);
            let _ = tx.send(RoundItem::Event(StreamEvent::ProviderError(info))).await;
            return Ok(rx);
        }

        let model = request.model.clone();
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut assembler = RoundAssembler::new(model);

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(RoundItem::Fault(Error::ProviderTransport(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.extend_from_slice(&bytes);

                while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end_matches(['\n', '\r']);

                    let Some(data) = line.strip_prefix("data:") else {
                        // `event:` names duplicate the JSON `type`; comments and
                        // blank separators carry nothing.
                        continue;
                    };

                    for item in assembler.handle_data(data.trim()) {
                        if tx.send(item).await.is_err() {
                            debug!("Round receiver dropped, stopping stream");
                            return;
                        }
                    }

                    if assembler.is_done() {
                        return;
                    }
                }
            }

            let _ = tx
                .send(RoundItem::Fault(Error::ProviderTransport(
                    "stream ended before message_stop".into(),
                )))
                .await;
        });

        Ok(rx)
    }
}

// ── SSE assembly ──────────────────────────────────────────────────────────

/// A content block still receiving deltas.
#[derive(Debug)]
enum PartialBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        json: String,
    },
}

/// Turns Anthropic SSE `data:` payloads into round items and accumulates the
/// assistant message. The message keeps the requested model id, not the
/// snapshot name the API echoes back.
#[derive(Debug)]
pub(crate) struct RoundAssembler {
    model: String,
    blocks: Vec<ContentBlock>,
    current: Option<PartialBlock>,
    done: bool,
}

impl RoundAssembler {
    pub(crate) fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            blocks: Vec::new(),
            current: None,
            done: false,
        }
    }

    /// Whether a terminal item has been produced.
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    pub(crate) fn handle_data(&mut self, data: &str) -> Vec<RoundItem> {
        if self.done || data.is_empty() {
            return Vec::new();
        }

        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                return Vec::new();
            }
        };

        let mut items = Vec::new();

        match event["type"].as_str().unwrap_or("") {
            "content_block_start" => {
                self.finish_block(&mut items);
                let block = &event["content_block"];
                self.current = match block["type"].as_str() {
                    Some("tool_use") => Some(PartialBlock::ToolUse {
                        id: block["id"].as_str().unwrap_or("").to_string(),
                        name: block["name"].as_str().unwrap_or("").to_string(),
                        json: String::new(),
                    }),
                    Some("text") => {
                        let initial = block["text"].as_str().unwrap_or("").to_string();
                        if !initial.is_empty() {
                            items.push(RoundItem::Event(StreamEvent::text_delta(&initial)));
                        }
                        Some(PartialBlock::Text(initial))
                    }
                    _ => None,
                };
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match (delta["type"].as_str(), self.current.as_mut()) {
                    (Some("text_delta"), Some(PartialBlock::Text(text))) => {
                        if let Some(piece) = delta["text"].as_str() {
                            text.push_str(piece);
                            items.push(RoundItem::Event(StreamEvent::text_delta(piece)));
                        }
                    }
                    (Some("input_json_delta"), Some(PartialBlock::ToolUse { json, .. })) => {
                        if let Some(partial) = delta["partial_json"].as_str() {
                            json.push_str(partial);
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => self.finish_block(&mut items),
            "message_stop" => {
                self.finish_block(&mut items);
                if !self.done {
                    let content = std::mem::take(&mut self.blocks);
                    items.push(RoundItem::Finished(Message::assistant(&self.model, content)));
                    self.done = true;
                }
            }
            "error" => {
                let info = ProviderErrorInfo::parse(data);
                warn!(message = %info.message, "Anthropic stream error");
                items.push(RoundItem::Event(StreamEvent::ProviderError(info)));
                self.done = true;
            }
            _ => {}
        }

        items
    }

    /// Close the block in progress, emitting `tool_use_requested` for tool blocks.
    fn finish_block(&mut self, items: &mut Vec<RoundItem>) {
        let Some(block) = self.current.take() else {
            return;
        };

        match block {
            PartialBlock::Text(text) => {
                if !text.is_empty() {
                    self.blocks.push(ContentBlock::Text { text });
                }
            }
            PartialBlock::ToolUse { id, name, json } => {
                let operation = match OperationName::parse(&name) {
                    Ok(op) => op,
                    Err(e) => {
                        items.push(RoundItem::Fault(e));
                        self.done = true;
                        return;
                    }
                };

                let input = if json.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    match serde_json::from_str(&json) {
                        Ok(v) => v,
                        Err(e) => {
                            items.push(RoundItem::Fault(Error::Serialization(e)));
                            self.done = true;
                            return;
                        }
                    }
                };

                items.push(RoundItem::Event(StreamEvent::ToolUseRequested {
                    id: id.clone(),
                    tool_id: operation.tool_id.clone(),
                    operation_id: operation.operation_id.clone(),
                    input: input.clone(),
                }));
                self.blocks.push(ContentBlock::ToolUse {
                    id,
                    tool_id: operation.tool_id,
                    operation_id: operation.operation_id,
                    input,
                });
            }
        }
    }
}

// ── Wire conversion ───────────────────────────────────────────────────────

/// Convert the conversation to Anthropic messages.
///
/// Tool results stored inside an assistant message are moved into the user
/// turn that follows it, and consecutive turns with the same role are merged.
pub(crate) fn to_api_messages(conversation: &Conversation) -> Vec<AnthropicMessage> {
    let mut turns: Vec<(&'static str, Vec<ApiBlock>)> = Vec::new();

    for message in conversation.messages() {
        match message {
            Message::User { content } => {
                let blocks = content.iter().filter_map(to_api_block).collect();
                turns.push(("user", blocks));
            }
            Message::Assistant { content, .. } => {
                let (results, own): (Vec<&ContentBlock>, Vec<&ContentBlock>) =
                    content.iter().partition(|b| b.is_tool_result());
                turns.push(("assistant", own.into_iter().filter_map(to_api_block).collect()));
                if !results.is_empty() {
                    turns.push(("user", results.into_iter().filter_map(to_api_block).collect()));
                }
            }
        }
    }

    let mut merged: Vec<AnthropicMessage> = Vec::new();
    for (role, blocks) in turns {
        if blocks.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => merged.push(AnthropicMessage {
                role,
                content: blocks,
            }),
        }
    }
    merged
}

fn to_api_block(block: &ContentBlock) -> Option<ApiBlock> {
    match block {
        ContentBlock::Text { text } if text.is_empty() => None,
        ContentBlock::Text { text } => Some(ApiBlock::Text { text: text.clone() }),
        ContentBlock::ToolUse {
            id,
            tool_id,
            operation_id,
            input,
        } => Some(ApiBlock::ToolUse {
            id: id.clone(),
            name: OperationName::new(tool_id, operation_id).qualified(),
            input: input.clone(),
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            output,
            is_error,
        } => Some(ApiBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: output.clone(),
            is_error: *is_error,
        }),
    }
}

/// Convert operations to Anthropic tool definitions.
pub(crate) fn to_api_tools(operations: &[OperationSpec]) -> Vec<AnthropicTool> {
    operations
        .iter()
        .map(|op| AnthropicTool {
            name: op.qualified_name(),
            description: op.description.clone(),
            input_schema: op.input_schema.clone(),
        })
        .collect()
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicMessage {
    role: &'static str,
    content: Vec<ApiBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut RoundAssembler, events: &[serde_json::Value]) -> Vec<RoundItem> {
        events
            .iter()
            .flat_map(|e| assembler.handle_data(&e.to_string()))
            .collect()
    }

    fn tool_use(id: &str, tool: &str, op: &str) -> ContentBlock {
        ContentBlock::ToolUse {
            id: id.into(),
            tool_id: tool.into(),
            operation_id: op.into(),
            input: serde_json::json!({"query": "X"}),
        }
    }

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert!(provider.has_api_key());
        assert!(provider.supports_model("claude-3-5-sonnet-latest"));
        assert!(!provider.supports_model("sonnet-3.5"));
    }

    #[test]
    fn constructor_with_base_url() {
        let provider =
            AnthropicProvider::new("sk-ant-test").with_base_url("https://custom.proxy.com/");
        assert_eq!(provider.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn api_key_can_be_replaced_at_runtime() {
        let provider = AnthropicProvider::new("");
        assert!(!provider.has_api_key());
        provider.set_api_key(" sk-ant-new ").unwrap();
        assert!(provider.has_api_key());
        assert_eq!(provider.current_key(), "sk-ant-new");
    }

    #[test]
    fn from_config_uses_configured_models() {
        let mut config = toolchat_config::AppConfig::default();
        config.max_tokens = 777;
        let provider = AnthropicProvider::from_config(&config);
        assert_eq!(provider.max_tokens, 777);
        assert_eq!(provider.models().len(), config.provider.models.len());
    }

    #[tokio::test]
    async fn unsupported_model_fails_before_network() {
        // Port 9 (discard) is never contacted: validation runs first.
        let provider = AnthropicProvider::new("k").with_base_url("http://127.0.0.1:9");
        let err = provider
            .stream_completion(CompletionRequest {
                model: "gpt-4o".into(),
                conversation: Conversation::from(vec![Message::user("hi")]),
                operations: vec![],
                max_tokens: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedModel(m) if m == "gpt-4o"));
    }

    #[tokio::test]
    async fn empty_conversation_fails_before_network() {
        let provider = AnthropicProvider::new("k").with_base_url("http://127.0.0.1:9");
        let err = provider
            .stream_completion(CompletionRequest {
                model: "claude-3-5-sonnet-latest".into(),
                conversation: Conversation::new(),
                operations: vec![],
                max_tokens: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConversation(_)));
    }

    #[test]
    fn request_body_includes_tools_only_when_offered() {
        let provider = AnthropicProvider::new("k");
        let mut request = CompletionRequest {
            model: "claude-3-5-sonnet-latest".into(),
            conversation: Conversation::from(vec![Message::user("hi")]),
            operations: vec![],
            max_tokens: None,
        };
        let body = provider.request_body(&request);
        assert!(body.get("tools").is_none());
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["stream"], true);

        request.operations.push(OperationSpec {
            tool_id: "exa".into(),
            operation_id: "search".into(),
            description: "Search the web".into(),
            input_schema: serde_json::json!({"type": "object"}),
        });
        let body = provider.request_body(&request);
        assert_eq!(body["tools"][0]["name"], "exa_search");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn text_round_is_assembled() {
        let mut asm = RoundAssembler::new("claude-3-5-sonnet-latest");
        let items = feed(
            &mut asm,
            &[
                serde_json::json!({"type": "message_start", "message": {"model": "claude-3-5-sonnet-20241022"}}),
                serde_json::json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                serde_json::json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hel"}}),
                serde_json::json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "lo"}}),
                serde_json::json!({"type": "content_block_stop", "index": 0}),
                serde_json::json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}}),
                serde_json::json!({"type": "message_stop"}),
            ],
        );

        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], RoundItem::Event(StreamEvent::TextDelta { text }) if text == "Hel"));
        assert!(matches!(&items[1], RoundItem::Event(StreamEvent::TextDelta { text }) if text == "lo"));
        match &items[2] {
            RoundItem::Finished(msg) => {
                assert_eq!(
                    msg,
                    &Message::assistant("claude-3-5-sonnet-latest", vec![ContentBlock::text("Hello")])
                );
            }
            other => panic!("expected Finished, got {other:?}"),
        }
        assert!(asm.is_done());
    }

    #[test]
    fn echoed_model_does_not_replace_requested_model() {
        let mut asm = RoundAssembler::new("claude-3-5-haiku-latest");
        let items = feed(
            &mut asm,
            &[
                serde_json::json!({"type": "message_start", "message": {"model": "claude-3-5-haiku-20241022"}}),
                serde_json::json!({"type": "message_stop"}),
            ],
        );

        match items.last() {
            Some(RoundItem::Finished(msg)) => {
                assert_eq!(msg, &Message::assistant("claude-3-5-haiku-latest", Vec::new()));
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn tool_use_round_is_assembled() {
        let mut asm = RoundAssembler::new("m");
        let items = feed(
            &mut asm,
            &[
                serde_json::json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                serde_json::json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Searching"}}),
                serde_json::json!({"type": "content_block_stop", "index": 0}),
                serde_json::json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "exa_search", "input": {}}}),
                serde_json::json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"query\":"}}),
                serde_json::json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "\"X\"}"}}),
                serde_json::json!({"type": "content_block_stop", "index": 1}),
                serde_json::json!({"type": "message_stop"}),
            ],
        );

        assert!(items.iter().any(|i| matches!(
            i,
            RoundItem::Event(StreamEvent::ToolUseRequested { id, tool_id, operation_id, input })
                if id == "toolu_1" && tool_id == "exa" && operation_id == "search" && input["query"] == "X"
        )));
        match items.last() {
            Some(RoundItem::Finished(msg)) => {
                assert_eq!(
                    msg.content(),
                    &[ContentBlock::text("Searching"), tool_use("toolu_1", "exa", "search")]
                );
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn tool_use_without_input_defaults_to_empty_object() {
        let mut asm = RoundAssembler::new("m");
        let items = feed(
            &mut asm,
            &[
                serde_json::json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t", "name": "linear_list_teams", "input": {}}}),
                serde_json::json!({"type": "content_block_stop", "index": 0}),
                serde_json::json!({"type": "message_stop"}),
            ],
        );
        match items.last() {
            Some(RoundItem::Finished(msg)) => {
                let calls = msg.tool_calls();
                assert_eq!(calls[0].operation_id, "list_teams");
                assert_eq!(calls[0].input, serde_json::json!({}));
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn tool_name_without_underscore_is_a_fault() {
        let mut asm = RoundAssembler::new("m");
        let items = feed(
            &mut asm,
            &[
                serde_json::json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t", "name": "search", "input": {}}}),
                serde_json::json!({"type": "content_block_stop", "index": 0}),
                serde_json::json!({"type": "message_stop"}),
            ],
        );
        assert_eq!(items.len(), 1);
        assert!(matches!(
            &items[0],
            RoundItem::Fault(Error::InvalidOperationName(name)) if name == "search"
        ));
        assert!(asm.is_done());
    }

    #[test]
    fn stream_error_event_becomes_provider_error() {
        let mut asm = RoundAssembler::new("m");
        let items = feed(
            &mut asm,
            &[
                serde_json::json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                serde_json::json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Par"}}),
                serde_json::json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
                serde_json::json!({"type": "message_stop"}),
            ],
        );
        assert_eq!(items.len(), 2);
        match &items[1] {
            RoundItem::Event(StreamEvent::ProviderError(info)) => {
                assert_eq!(info.message, "Overloaded");
                assert_eq!(info.body.as_ref().unwrap()["error"]["type"], "overloaded_error");
            }
            other => panic!("expected ProviderError, got {other:?}"),
        }
        assert!(asm.is_done());
    }

    #[test]
    fn unparseable_data_is_ignored() {
        let mut asm = RoundAssembler::new("m");
        assert!(asm.handle_data("not json").is_empty());
        assert!(!asm.is_done());
    }

    #[test]
    fn message_conversion_user_assistant() {
        let conv = Conversation::from(vec![
            Message::user("Hello"),
            Message::assistant("m", vec![ContentBlock::text("Hi!")]),
            Message::user("Bye"),
        ]);
        let api = serde_json::to_value(to_api_messages(&conv)).unwrap();
        assert_eq!(api.as_array().unwrap().len(), 3);
        assert_eq!(api[0]["role"], "user");
        assert_eq!(api[0]["content"][0]["type"], "text");
        assert_eq!(api[1]["role"], "assistant");
    }

    #[test]
    fn message_conversion_with_tool_use_and_result_turn() {
        let conv = Conversation::from(vec![
            Message::user("search for X"),
            Message::assistant("m", vec![tool_use("toolu_1", "exa", "search")]),
            Message::tool_results(vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_1".into(),
                output: "results".into(),
                is_error: true,
            }]),
        ]);
        let api = serde_json::to_value(to_api_messages(&conv)).unwrap();
        assert_eq!(api[1]["content"][0]["type"], "tool_use");
        assert_eq!(api[1]["content"][0]["name"], "exa_search");
        assert_eq!(api[2]["role"], "user");
        assert_eq!(api[2]["content"][0]["type"], "tool_result");
        assert_eq!(api[2]["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(api[2]["content"][0]["is_error"], true);
    }

    #[test]
    fn tool_results_inside_assistant_move_to_user_turn() {
        let conv = Conversation::from(vec![
            Message::user("search for X"),
            Message::assistant(
                "m",
                vec![
                    tool_use("toolu_1", "exa", "search"),
                    ContentBlock::ToolResult {
                        tool_use_id: "toolu_1".into(),
                        output: "results".into(),
                        is_error: false,
                    },
                ],
            ),
            Message::user("thanks, and?"),
        ]);
        let api = serde_json::to_value(to_api_messages(&conv)).unwrap();
        let turns = api.as_array().unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1]["content"].as_array().unwrap().len(), 1);
        assert_eq!(turns[2]["role"], "user");
        assert_eq!(turns[2]["content"][0]["type"], "tool_result");
        assert!(turns[2]["content"][0].get("is_error").is_none());
        assert_eq!(turns[2]["content"][1]["text"], "thanks, and?");
    }

    #[test]
    fn empty_text_blocks_are_dropped() {
        let conv = Conversation::from(vec![
            Message::user("hi"),
            Message::assistant("m", vec![ContentBlock::text("")]),
            Message::user("again"),
        ]);
        let api = serde_json::to_value(to_api_messages(&conv)).unwrap();
        let turns = api.as_array().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0]["content"].as_array().unwrap().len(), 2);
    }
}
