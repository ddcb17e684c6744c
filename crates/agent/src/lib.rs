//! The orchestration loop, the heart of toolchat.
//!
//! A run follows an **Ask → Dispatch → Fold** cycle:
//!
//! 1. **Ask** the provider for a streaming round, relaying its events
//! 2. **If tool uses**: dispatch them through the tool gateway, relay results
//! 3. **Fold** the results back into the conversation and ask again
//!
//! The loop ends when the model answers without tool uses, the provider
//! reports an error, the caller cancels, or the round limit is reached.

pub mod orchestrator;
pub mod title;

pub use orchestrator::{Orchestrator, RunHandle, RunOutcome, RunStatus};
pub use title::generate_title;
