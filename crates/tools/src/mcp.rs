//! MCP stdio backends.
//!
//! Each enabled tool runs as a child process (`npx`/`uvx`) speaking the Model
//! Context Protocol over stdio. Tool-level failures reported by the backend
//! (`isError` or a JSON-RPC error) become failed outcomes; a broken
//! connection is a transport error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::{RoleClient, ServiceError};
use rmcp::model::CallToolRequestParam;
use rmcp::service::{Peer, RunningService};
use rmcp::transport::TokioChildProcess;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;
use toolchat_config::ToolsConfig;
use toolchat_core::error::GatewayError;
use toolchat_core::tool::{OperationSpec, Tool, ToolOutcome};
use tracing::{debug, info, warn};

use crate::gateway::{BackendFactory, ToolConnection};

/// Launches tool backends as MCP child processes.
#[derive(Debug, Clone)]
pub struct McpBackendFactory {
    connect_timeout: Duration,
    list_timeout: Duration,
    call_timeout: Duration,
}

impl McpBackendFactory {
    pub fn new(connect_timeout: Duration, list_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            list_timeout,
            call_timeout,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.list_timeout_secs),
            Duration::from_secs(config.call_timeout_secs),
        )
    }
}

#[async_trait]
impl BackendFactory for McpBackendFactory {
    async fn connect(&self, tool: &Tool) -> Result<Arc<dyn ToolConnection>, String> {
        let spec = tool.launch_spec();
        info!(
            tool = %tool.id,
            command = %spec.command,
            args = ?spec.args,
            "Launching MCP tool backend"
        );

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args).envs(&spec.env);

        let transport =
            TokioChildProcess::new(cmd).map_err(|e| format!("failed to spawn {}: {e}", spec.command))?;

        let service = timeout(self.connect_timeout, rmcp::service::serve_client((), transport))
            .await
            .map_err(|_| {
                format!(
                    "MCP handshake timed out after {}s",
                    self.connect_timeout.as_secs()
                )
            })?
            .map_err(|e| format!("MCP handshake failed: {e}"))?;

        Ok(Arc::new(McpConnection {
            tool_id: tool.id.clone(),
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
            list_timeout: self.list_timeout,
            call_timeout: self.call_timeout,
        }))
    }
}

/// One running MCP backend.
pub struct McpConnection {
    tool_id: String,
    peer: Peer<RoleClient>,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
    list_timeout: Duration,
    call_timeout: Duration,
}

impl McpConnection {
    fn transport_error(&self, reason: impl Into<String>) -> GatewayError {
        transport_error(&self.tool_id, reason)
    }

    fn call_error(&self, operation_id: &str, error: ServiceError) -> Result<ToolOutcome, GatewayError> {
        let result = classify_call_error(&self.tool_id, error);
        if let Ok(outcome) = &result {
            warn!(
                tool = %self.tool_id,
                operation = %operation_id,
                error = %outcome.content,
                "MCP tool call rejected by backend"
            );
        }
        result
    }
}

fn transport_error(tool_id: &str, reason: impl Into<String>) -> GatewayError {
    GatewayError::Transport {
        tool_id: tool_id.to_string(),
        reason: reason.into(),
    }
}

/// JSON-RPC errors and request timeouts are answers from the backend and
/// become failed outcomes. Everything else means the connection is unusable.
fn classify_call_error(tool_id: &str, error: ServiceError) -> Result<ToolOutcome, GatewayError> {
    match error {
        ServiceError::McpError(data) => Ok(ToolOutcome::failure(data.message.into_owned())),
        e @ ServiceError::Timeout { .. } => Ok(ToolOutcome::failure(e.to_string())),
        e => Err(transport_error(tool_id, e.to_string())),
    }
}

#[async_trait]
impl ToolConnection for McpConnection {
    async fn list_operations(&self) -> Result<Vec<OperationSpec>, GatewayError> {
        let listed = timeout(self.list_timeout, self.peer.list_tools(Default::default()))
            .await
            .map_err(|_| self.transport_error("list tools timed out"))?
            .map_err(|e| self.transport_error(format!("list tools failed: {e}")))?;

        Ok(listed
            .tools
            .into_iter()
            .map(|tool| OperationSpec {
                tool_id: self.tool_id.clone(),
                operation_id: tool.name.to_string(),
                description: tool
                    .description
                    .as_deref()
                    .map(str::to_string)
                    .unwrap_or_default(),
                input_schema: Value::Object(tool.input_schema.as_ref().clone()),
            })
            .collect())
    }

    async fn invoke(&self, operation_id: &str, input: Value) -> Result<ToolOutcome, GatewayError> {
        let arguments = match input {
            Value::Null => None,
            Value::Object(map) => Some(map),
            other => {
                return Ok(ToolOutcome::failure(format!(
                    "Operation '{operation_id}' expects object arguments, received {other}"
                )));
            }
        };

        let params = CallToolRequestParam {
            name: operation_id.to_string().into(),
            arguments,
        };

        debug!(tool = %self.tool_id, operation = %operation_id, "Calling MCP tool");

        let result = match timeout(self.call_timeout, self.peer.call_tool(params)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => return self.call_error(operation_id, e),
            Err(_) => {
                warn!(tool = %self.tool_id, operation = %operation_id, "MCP tool call timed out");
                return Ok(ToolOutcome::failure(format!(
                    "Operation '{operation_id}' timed out after {}s",
                    self.call_timeout.as_secs()
                )));
            }
        };

        let value = serde_json::to_value(&result)
            .map_err(|e| self.transport_error(format!("unreadable tool result: {e}")))?;
        Ok(outcome_from_result(&value))
    }

    async fn shutdown(&self) {
        let Some(service) = self.service.lock().await.take() else {
            return;
        };
        match service.cancel().await {
            Ok(reason) => debug!(tool = %self.tool_id, reason = ?reason, "MCP backend stopped"),
            Err(e) => warn!(tool = %self.tool_id, error = %e, "MCP backend did not stop cleanly"),
        }
    }
}

/// Flatten a serialized `CallToolResult`: text items are joined with newlines,
/// other items are kept as JSON.
fn outcome_from_result(result: &Value) -> ToolOutcome {
    let content = result["content"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| match (item["type"].as_str(), item["text"].as_str()) {
                    (Some("text"), Some(text)) => text.to_string(),
                    _ => item.to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    ToolOutcome {
        content,
        is_error: result["isError"].as_bool().unwrap_or(false),
    }
}
