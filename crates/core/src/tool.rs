//! Tool abstractions shared by the orchestrator and the tool gateway.
//!
//! Tools are external backends that expose named operations. The model sees
//! every operation under a namespaced name `<toolId>_<operationId>`; this
//! module owns the encoding and decoding of those names.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, GatewayError};

/// A decoded `(tool id, operation id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationName {
    pub tool_id: String,
    pub operation_id: String,
}

impl OperationName {
    pub fn new(tool_id: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            operation_id: operation_id.into(),
        }
    }

    /// Decode a provider-facing name. The tool id is everything before the
    /// first underscore; the operation id may itself contain underscores.
    pub fn parse(name: &str) -> Result<Self, Error> {
        match name.split_once('_') {
            Some((tool_id, operation_id)) if !tool_id.is_empty() && !operation_id.is_empty() => {
                Ok(Self::new(tool_id, operation_id))
            }
            _ => Err(Error::InvalidOperationName(name.to_string())),
        }
    }

    /// The name exposed to the provider.
    pub fn qualified(&self) -> String {
        format!("{}_{}", self.tool_id, self.operation_id)
    }
}

impl std::fmt::Display for OperationName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.tool_id, self.operation_id)
    }
}

/// An operation discovered on a live backend, as offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSpec {
    pub tool_id: String,
    pub operation_id: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema describing the operation input.
    pub input_schema: serde_json::Value,
}

impl OperationSpec {
    pub fn qualified_name(&self) -> String {
        OperationName::new(&self.tool_id, &self.operation_id).qualified()
    }
}

/// Where a tool backend package is published. Decides the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageRegistry {
    Npm,
    Pypi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub registry: PackageRegistry,
    pub name: String,
}

/// Presentation data for one operation of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDescriptor {
    pub description: String,
    pub progress_label: String,
    pub done_label: String,
}

/// A tool definition as kept in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Stable identifier; also the prefix of every operation name.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon_url: String,
    pub package: PackageSpec,
    /// Extra launch arguments appended after the package name.
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// Environment variables passed to the backend process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub enabled: bool,
    /// Operation catalog, keyed by operation id.
    #[serde(default)]
    pub operations: BTreeMap<String, OperationDescriptor>,
}

impl Tool {
    /// The process to start for this tool.
    pub fn launch_spec(&self) -> LaunchSpec {
        let (command, mut args) = match self.package.registry {
            PackageRegistry::Npm => ("npx", vec!["-y".to_string(), self.package.name.clone()]),
            PackageRegistry::Pypi => ("uvx", vec![self.package.name.clone()]),
        };
        if let Some(extra) = &self.args {
            args.extend(extra.iter().cloned());
        }
        LaunchSpec {
            command: command.to_string(),
            args,
            env: self.env.clone(),
        }
    }
}

/// Command line and environment for a backend process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// A request to execute one operation, taken from a ToolUse block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// The ToolUse block id assigned by the provider.
    pub id: String,
    pub tool_id: String,
    pub operation_id: String,
    pub input: serde_json::Value,
}

/// What a backend returned for one invocation. Tool-level failures are
/// outcomes with `is_error` set, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// The orchestrator's view of the tool side.
///
/// Implemented by the tool manager in `toolchat-tools`; tests use in-memory
/// doubles.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Operations currently offered for the given tool selection. Only enabled,
    /// connected tools contribute.
    async fn operations(&self, selection: &[String]) -> Vec<OperationSpec>;

    /// Execute one operation.
    async fn invoke(
        &self,
        tool_id: &str,
        operation_id: &str,
        input: serde_json::Value,
    ) -> std::result::Result<ToolOutcome, GatewayError>;
}
