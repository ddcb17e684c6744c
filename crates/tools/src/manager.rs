//! Tool manager: the registry and the gateway behind one writer lock.
//!
//! Every mutation updates the registry and then rebuilds the gateway before
//! the writer lock is released, so the live connections always follow the
//! latest registry state. A failed rebuild keeps the registry change.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use toolchat_config::ToolsConfig;
use toolchat_core::error::{GatewayError, RegistryError, Result};
use toolchat_core::tool::{OperationSpec, Tool, ToolDispatcher, ToolOutcome};
use tracing::info;

use crate::catalog::load_catalog;
use crate::gateway::{BackendFactory, ToolGateway};
use crate::mcp::McpBackendFactory;
use crate::registry::ToolRegistry;

pub struct ToolManager {
    registry: RwLock<ToolRegistry>,
    gateway: ToolGateway,
    writer: Mutex<()>,
}

impl ToolManager {
    pub fn new(registry: ToolRegistry, factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            registry: RwLock::new(registry),
            gateway: ToolGateway::new(factory),
            writer: Mutex::new(()),
        }
    }

    /// Built-in catalog plus config overrides, backed by MCP child processes.
    pub fn from_config(config: &ToolsConfig) -> std::result::Result<Self, RegistryError> {
        let registry = ToolRegistry::new(load_catalog(&config.catalog))?;
        Ok(Self::new(
            registry,
            Arc::new(McpBackendFactory::from_config(config)),
        ))
    }

    /// Connect the tools that start out enabled.
    pub async fn start(&self) -> std::result::Result<(), GatewayError> {
        let _writer = self.writer.lock().await;
        let tools = self.registry.read().await.list().to_vec();
        self.gateway.rebuild(&tools).await
    }

    pub async fn list(&self) -> Vec<Tool> {
        self.registry.read().await.list().to_vec()
    }

    pub async fn get(&self, id: &str) -> Option<Tool> {
        self.registry.read().await.get(id).cloned()
    }

    /// Ids of tools with a live backend.
    pub async fn connected(&self) -> Vec<String> {
        self.gateway.connected().await
    }

    pub async fn replace_all(&self, tools: Vec<Tool>) -> Result<Vec<Tool>> {
        self.mutate(|registry| {
            registry.replace_all(tools)?;
            Ok(())
        })
        .await?;
        Ok(self.list().await)
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Tool> {
        info!(tool = %id, enabled, "Toggling tool");
        self.mutate(|registry| Ok(registry.set_enabled(id, enabled)?.clone()))
            .await
    }

    pub async fn set_args(&self, id: &str, args: Option<Vec<String>>) -> Result<Tool> {
        self.mutate(|registry| Ok(registry.set_args(id, args)?.clone()))
            .await
    }

    pub async fn set_env(&self, id: &str, env: BTreeMap<String, String>) -> Result<Tool> {
        self.mutate(|registry| Ok(registry.set_env(id, env)?.clone()))
            .await
    }

    /// Apply `change` under the writer lock, then rebuild the gateway.
    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut ToolRegistry) -> std::result::Result<T, RegistryError>,
    ) -> Result<T> {
        let _writer = self.writer.lock().await;
        let (value, tools) = {
            let mut registry = self.registry.write().await;
            let value = change(&mut registry)?;
            (value, registry.list().to_vec())
        };
        self.gateway.rebuild(&tools).await?;
        Ok(value)
    }

    /// Stop every backend.
    pub async fn shutdown(&self) {
        let _writer = self.writer.lock().await;
        self.gateway.shutdown().await;
    }
}

#[async_trait]
impl ToolDispatcher for ToolManager {
    async fn operations(&self, selection: &[String]) -> Vec<OperationSpec> {
        self.gateway.list_operations(selection).await
    }

    async fn invoke(
        &self,
        tool_id: &str,
        operation_id: &str,
        input: serde_json::Value,
    ) -> std::result::Result<ToolOutcome, GatewayError> {
        self.gateway.invoke(tool_id, operation_id, input).await
    }
}
