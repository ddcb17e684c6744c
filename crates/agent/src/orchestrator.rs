//! The orchestration loop.
//!
//! One run alternates provider rounds and tool dispatch until the model
//! answers without requesting tools:
//!
//! 1. **Ask** the provider for a round with the conversation and the
//!    operations of the selected tools, relaying its events as they arrive
//! 2. **Append** the assembled assistant message
//! 3. **If tool uses**: invoke them concurrently, relay each result as it
//!    completes, append one tool-result turn in request order, go to 1
//! 4. **Otherwise** the run is complete
//!
//! A provider error ends the run without appending the failed round.
//! Cancellation (token or a dropped event receiver) returns the conversation
//! accumulated so far.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolchat_core::error::{Error, Result};
use toolchat_core::message::{ContentBlock, Conversation, Message};
use toolchat_core::provider::{CompletionRequest, Provider, RoundItem};
use toolchat_core::stream_event::StreamEvent;
use toolchat_core::tool::{ToolCall, ToolDispatcher, ToolOutcome};
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The model produced a message without tool uses.
    Completed,
    /// The provider reported an error; the failed round was not appended.
    ProviderError,
    /// The run was cancelled or its event receiver went away.
    Cancelled,
    /// `max_rounds` provider rounds ran without converging.
    RoundLimit,
}

/// The result of a run that did not fail.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The input conversation plus every message the run appended.
    pub conversation: Conversation,
    /// Provider rounds started.
    pub rounds: u32,
    pub status: RunStatus,
}

/// A run executing on its own task.
pub struct RunHandle {
    /// Correlates the run's log lines.
    pub run_id: Uuid,
    pub events: mpsc::Receiver<StreamEvent>,
    pub cancel: CancellationToken,
    pub task: JoinHandle<Result<RunOutcome>>,
}

/// Drives provider rounds and tool dispatch.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    tools: Arc<dyn ToolDispatcher>,
    max_rounds: u32,
    max_tokens: Option<u32>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            provider,
            tools,
            max_rounds: 25,
            max_tokens: None,
        }
    }

    pub fn from_config(
        provider: Arc<dyn Provider>,
        tools: Arc<dyn ToolDispatcher>,
        config: &toolchat_config::AppConfig,
    ) -> Self {
        Self::new(provider, tools)
            .with_max_rounds(config.agent.max_rounds)
            .with_max_tokens(config.max_tokens)
    }

    /// Set the maximum number of provider rounds per run.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max;
        self
    }

    /// Set the max tokens per provider round.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Reject a run before anything is streamed.
    pub fn validate(&self, model: &str, conversation: &Conversation) -> Result<()> {
        if !self.provider.supports_model(model) {
            return Err(Error::UnsupportedModel(model.to_string()));
        }
        conversation.validate_for_round()
    }

    /// Run to completion, relaying events into `events`.
    ///
    /// Fatal errors (transport faults, malformed tool names, invokes against
    /// tools without a live connection) are returned as `Err`; everything the
    /// run appended before the failure is lost with it.
    pub async fn run(
        &self,
        model: &str,
        mut conversation: Conversation,
        selection: &[String],
        events: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        info!(
            model = %model,
            messages = conversation.len(),
            tools = ?selection,
            "Starting orchestration run"
        );

        let mut rounds = 0;
        let finish = |conversation: Conversation,
                      rounds: u32,
                      status: RunStatus|
         -> Result<RunOutcome> {
            debug!(rounds, status = ?status, "Orchestration run finished");
            Ok(RunOutcome {
                conversation,
                rounds,
                status,
            })
        };

        loop {
            if cancel.is_cancelled() || events.is_closed() {
                return finish(conversation, rounds, RunStatus::Cancelled);
            }

            if rounds >= self.max_rounds {
                warn!(max_rounds = self.max_rounds, "Round limit reached");
                let reason = format!("Stopped after {} rounds without a final answer", rounds);
                emit(events, StreamEvent::Aborted { reason }).await;
                return finish(conversation, rounds, RunStatus::RoundLimit);
            }

            rounds += 1;
            let operations = self.tools.operations(selection).await;
            debug!(round = rounds, operations = operations.len(), "Starting provider round");

            let request = CompletionRequest {
                model: model.to_string(),
                conversation: conversation.clone(),
                operations,
                max_tokens: self.max_tokens,
            };

            let message = match self.provider_round(request, events, cancel).await? {
                RoundEnd::Finished(message) => message,
                RoundEnd::ProviderError => {
                    return finish(conversation, rounds, RunStatus::ProviderError);
                }
                RoundEnd::Cancelled => return finish(conversation, rounds, RunStatus::Cancelled),
            };

            let calls = message.tool_calls();
            let complete = StreamEvent::RoundComplete {
                round: rounds,
                message: message.clone(),
            };
            conversation.push(message);
            if !emit(events, complete).await {
                return finish(conversation, rounds, RunStatus::Cancelled);
            }

            if calls.is_empty() {
                return finish(conversation, rounds, RunStatus::Completed);
            }

            if cancel.is_cancelled() {
                return finish(conversation, rounds, RunStatus::Cancelled);
            }

            match self.dispatch(&calls, selection, events, cancel).await? {
                Some(results) => conversation.push(Message::tool_results(results)),
                None => return finish(conversation, rounds, RunStatus::Cancelled),
            }
        }
    }

    /// Start a run on a new task. An `Err` is also reported to the receiver as
    /// an `aborted` event.
    pub fn spawn(
        self: Arc<Self>,
        model: String,
        conversation: Conversation,
        selection: Vec<String>,
        buffer: usize,
    ) -> RunHandle {
        let (tx, rx) = mpsc::channel(buffer);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);

        let run = async move {
            let result = self.run(&model, conversation, &selection, &tx, &token).await;
            match &result {
                Ok(outcome) => info!(
                    rounds = outcome.rounds,
                    status = ?outcome.status,
                    messages = outcome.conversation.len(),
                    "Orchestration run ended"
                ),
                Err(e) => {
                    error!(error = %e, "Orchestration run failed");
                    emit(
                        &tx,
                        StreamEvent::Aborted {
                            reason: e.to_string(),
                        },
                    )
                    .await;
                }
            }
            result
        };
        let task = tokio::spawn(run.instrument(span));

        RunHandle {
            run_id,
            events: rx,
            cancel,
            task,
        }
    }

    async fn provider_round(
        &self,
        request: CompletionRequest,
        events: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<RoundEnd> {
        let mut items = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(RoundEnd::Cancelled),
            rx = self.provider.stream_completion(request) => rx?,
        };

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(RoundEnd::Cancelled),
                item = items.recv() => item,
            };

            match item {
                Some(RoundItem::Event(event)) => {
                    let provider_error = matches!(event, StreamEvent::ProviderError(_));
                    if provider_error {
                        warn!(event = ?event, "Provider reported an error");
                    }
                    if !emit(events, event).await {
                        return Ok(RoundEnd::Cancelled);
                    }
                    if provider_error {
                        return Ok(RoundEnd::ProviderError);
                    }
                }
                Some(RoundItem::Finished(message)) => return Ok(RoundEnd::Finished(message)),
                Some(RoundItem::Fault(e)) => return Err(e),
                None => {
                    return Err(Error::ProviderTransport(
                        "provider stream closed without a final message".into(),
                    ));
                }
            }
        }
    }

    /// Invoke every call concurrently. Results are relayed in completion order
    /// and returned in request order; `None` means the run was cancelled.
    /// Calls to tools outside `selection` fail without reaching a backend.
    async fn dispatch(
        &self,
        calls: &[ToolCall],
        selection: &[String],
        events: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<ContentBlock>>> {
        debug!(tool_count = calls.len(), "Dispatching tool calls");

        let mut pending: FuturesUnordered<_> = calls
            .iter()
            .enumerate()
            .map(|(index, call)| async move {
                if !selection.contains(&call.tool_id) {
                    warn!(
                        tool = %call.tool_id,
                        operation = %call.operation_id,
                        "Model requested a tool outside the selection"
                    );
                    let outcome = ToolOutcome::failure(format!(
                        "Tool '{}' is not selected for this conversation",
                        call.tool_id
                    ));
                    return (index, Ok(outcome));
                }
                let outcome = self
                    .tools
                    .invoke(&call.tool_id, &call.operation_id, call.input.clone())
                    .await;
                (index, outcome)
            })
            .collect();

        let mut results: Vec<Option<ContentBlock>> = vec![None; calls.len()];

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = pending.next() => next,
            };
            let Some((index, outcome)) = next else {
                break;
            };

            let call = &calls[index];
            let outcome = outcome?;
            if outcome.is_error {
                warn!(
                    tool = %call.tool_id,
                    operation = %call.operation_id,
                    "Tool operation reported an error"
                );
            }

            let event = StreamEvent::ToolResult {
                tool_use_id: call.id.clone(),
                tool_id: call.tool_id.clone(),
                operation_id: call.operation_id.clone(),
                output: outcome.content.clone(),
                is_error: outcome.is_error,
            };
            if !emit(events, event).await {
                return Ok(None);
            }

            results[index] = Some(ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                output: outcome.content,
                is_error: outcome.is_error,
            });
        }

        Ok(Some(results.into_iter().flatten().collect()))
    }
}

enum RoundEnd {
    Finished(Message),
    ProviderError,
    Cancelled,
}

/// Send one event; `false` when the receiver is gone.
async fn emit(events: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    trace!(event = event.event_type(), "Relaying stream event");
    events.send(event).await.is_ok()
}
