//! Error types for the toolchat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] is the union the
//! orchestration loop propagates.

use thiserror::Error;

use crate::stream_event::ProviderErrorInfo;

/// The top-level error type for all toolchat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Request validation (rejected before any network call) ---
    #[error("Model is not supported: {0}")]
    UnsupportedModel(String),

    #[error("Invalid conversation: {0}")]
    InvalidConversation(String),

    // --- Contract violations (fatal to the current run) ---
    #[error("Invalid operation name: {0}")]
    InvalidOperationName(String),

    #[error("Tool gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Tool registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Provider-reported failures (non-streaming calls) ---
    #[error("Provider error: {}", .0.message)]
    Provider(ProviderErrorInfo),

    // --- Transport faults ---
    #[error("Provider transport failure: {0}")]
    ProviderTransport(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Invoke against a tool id that has no live connection.
    #[error("No live connection for tool '{0}'")]
    NotConnected(String),

    /// One or more backends could not be launched during a rebuild.
    #[error("Failed to launch tool backends: {}", format_failures(.failures))]
    LaunchFailed { failures: Vec<LaunchFailure> },

    /// The backend connection broke while talking to it.
    #[error("Tool backend transport failure for '{tool_id}': {reason}")]
    Transport { tool_id: String, reason: String },
}

/// A single backend that failed to start.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchFailure {
    pub tool_id: String,
    pub reason: String,
}

fn format_failures(failures: &[LaunchFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.tool_id, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Duplicate tool id: {0}")]
    DuplicateTool(String),

    #[error("Invalid tool id '{0}': ids must be non-empty and contain no underscore")]
    InvalidToolId(String),
}
