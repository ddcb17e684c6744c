//! # toolchat core
//!
//! Domain types, traits, and error definitions for the toolchat
//! orchestration runtime. This crate has **no framework dependencies**: it
//! defines the model that the provider, tool and agent crates implement
//! against.
//!
//! - [`message`]: conversations, messages and content blocks
//! - [`stream_event`]: the events relayed to the caller while a run streams
//! - [`provider`]: the LLM provider abstraction
//! - [`tool`]: operation naming and the tool dispatcher abstraction

pub mod error;
pub mod message;
pub mod provider;
pub mod stream_event;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, GatewayError, LaunchFailure, RegistryError, Result};
pub use message::{ContentBlock, Conversation, Message};
pub use provider::{CompletionRequest, ModelInfo, Provider, RoundItem};
pub use stream_event::{ProviderErrorInfo, StreamEvent};
pub use tool::{
    LaunchSpec, OperationDescriptor, OperationName, OperationSpec, PackageRegistry, PackageSpec,
    Tool, ToolCall, ToolDispatcher, ToolOutcome,
};
