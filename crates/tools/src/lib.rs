//! Tools for toolchat.
//!
//! Tools are external MCP servers the model can call mid-conversation:
//! web search, sequential thinking, the file system, Linear, sandboxed code.
//!
//! - [`registry`]: tool definitions (enabled flag, args, env, operations)
//! - [`catalog`]: the built-in tool list
//! - [`gateway`]: live backend connections, rebuilt in generations
//! - [`mcp`]: MCP stdio backends
//! - [`manager`]: registry + gateway under one writer lock

pub mod catalog;
pub mod gateway;
pub mod manager;
pub mod mcp;
pub mod registry;

pub use catalog::{builtin_tools, load_catalog};
pub use gateway::{BackendFactory, ToolConnection, ToolGateway};
pub use manager::ToolManager;
pub use mcp::McpBackendFactory;
pub use registry::ToolRegistry;
