//! LLM provider implementations for toolchat.
//!
//! All providers implement the `toolchat_core::Provider` trait. The server
//! ships with Anthropic's Messages API; tests substitute scripted providers.

pub mod anthropic;

pub use anthropic::AnthropicProvider;
