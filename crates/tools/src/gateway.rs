//! Tool gateway: live connections to enabled tool backends.
//!
//! Connections are grouped in generations. [`ToolGateway::rebuild`] connects a
//! fresh generation, swaps it in, then shuts the previous one down. Invokes
//! clone the connection handle out of the current generation, so an in-flight
//! call finishes (or fails) on the connection it started on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use toolchat_core::error::{GatewayError, LaunchFailure};
use toolchat_core::tool::{OperationSpec, Tool, ToolOutcome};
use tracing::{debug, info, warn};

/// A live connection to one tool backend.
#[async_trait]
pub trait ToolConnection: Send + Sync {
    /// Operations the backend exposes, with `tool_id` filled in.
    async fn list_operations(&self) -> Result<Vec<OperationSpec>, GatewayError>;

    async fn invoke(
        &self,
        operation_id: &str,
        input: serde_json::Value,
    ) -> Result<ToolOutcome, GatewayError>;

    /// Stop the backend. Must be safe to call more than once.
    async fn shutdown(&self);
}

/// Builds connections from tool definitions.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Launch the tool's backend. The error string ends up in a [`LaunchFailure`].
    async fn connect(&self, tool: &Tool) -> Result<Arc<dyn ToolConnection>, String>;
}

struct LiveTool {
    tool_id: String,
    connection: Arc<dyn ToolConnection>,
    operations: Vec<OperationSpec>,
}

#[derive(Default)]
struct Generation {
    id: u64,
    tools: Vec<LiveTool>,
}

impl Generation {
    fn find(&self, tool_id: &str) -> Option<&LiveTool> {
        self.tools.iter().find(|t| t.tool_id == tool_id)
    }

    async fn shutdown(&self) {
        join_all(self.tools.iter().map(|t| t.connection.shutdown())).await;
    }
}

pub struct ToolGateway {
    factory: Arc<dyn BackendFactory>,
    current: RwLock<Arc<Generation>>,
    rebuild_lock: Mutex<()>,
    next_generation: AtomicU64,
}

impl ToolGateway {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            current: RwLock::new(Arc::new(Generation::default())),
            rebuild_lock: Mutex::new(()),
            next_generation: AtomicU64::new(1),
        }
    }

    async fn snapshot(&self) -> Arc<Generation> {
        self.current.read().await.clone()
    }

    /// Operations of the connected tools in `selection`, in catalog order.
    pub async fn list_operations(&self, selection: &[String]) -> Vec<OperationSpec> {
        let generation = self.snapshot().await;
        generation
            .tools
            .iter()
            .filter(|t| selection.iter().any(|s| *s == t.tool_id))
            .flat_map(|t| t.operations.iter().cloned())
            .collect()
    }

    pub async fn invoke(
        &self,
        tool_id: &str,
        operation_id: &str,
        input: serde_json::Value,
    ) -> Result<ToolOutcome, GatewayError> {
        let connection = {
            let generation = self.snapshot().await;
            generation
                .find(tool_id)
                .map(|t| t.connection.clone())
                .ok_or_else(|| GatewayError::NotConnected(tool_id.to_string()))?
        };

        debug!(tool = %tool_id, operation = %operation_id, "Invoking tool operation");
        connection.invoke(operation_id, input).await
    }

    /// Ids of tools with a live connection, in catalog order.
    pub async fn connected(&self) -> Vec<String> {
        self.snapshot()
            .await
            .tools
            .iter()
            .map(|t| t.tool_id.clone())
            .collect()
    }

    /// Replace the live connections with one per enabled tool in `tools`.
    ///
    /// Backends that fail to launch are left out; the rest are installed and
    /// the failures are returned as [`GatewayError::LaunchFailed`].
    pub async fn rebuild(&self, tools: &[Tool]) -> Result<(), GatewayError> {
        let _guard = self.rebuild_lock.lock().await;
        let id = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let enabled: Vec<&Tool> = tools.iter().filter(|t| t.enabled).collect();
        let attempts = join_all(enabled.iter().map(|tool| self.launch(tool))).await;

        let mut live = Vec::new();
        let mut failures = Vec::new();
        for attempt in attempts {
            match attempt {
                Ok(tool) => live.push(tool),
                Err(failure) => failures.push(failure),
            }
        }

        info!(
            generation = id,
            connected = live.len(),
            failed = failures.len(),
            "Tool gateway rebuilt"
        );

        let previous = {
            let mut current = self.current.write().await;
            std::mem::replace(&mut *current, Arc::new(Generation { id, tools: live }))
        };
        debug!(generation = previous.id, "Shutting down previous tool generation");
        previous.shutdown().await;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::LaunchFailed { failures })
        }
    }

    async fn launch(&self, tool: &Tool) -> Result<LiveTool, LaunchFailure> {
        let failure = |reason: String| {
            warn!(tool = %tool.id, reason = %reason, "Tool backend failed to launch");
            LaunchFailure {
                tool_id: tool.id.clone(),
                reason,
            }
        };

        let connection = self.factory.connect(tool).await.map_err(failure)?;
        let operations = match connection.list_operations().await {
            Ok(ops) => ops,
            Err(e) => {
                connection.shutdown().await;
                return Err(failure(e.to_string()));
            }
        };

        debug!(tool = %tool.id, operations = operations.len(), "Tool backend connected");
        Ok(LiveTool {
            tool_id: tool.id.clone(),
            connection,
            operations,
        })
    }

    /// Shut down every live connection.
    pub async fn shutdown(&self) {
        let _guard = self.rebuild_lock.lock().await;
        let previous = {
            let mut current = self.current.write().await;
            std::mem::take(&mut *current)
        };
        previous.shutdown().await;
    }
}
