//! Conversation orchestrator: drive the agent until it signals completion.
//!
//! ## State machine
//!
//! ```text
//!            ┌───────────────────────────────┐
//!            ▼                               │
//!   AwaitingResponse ──tool_use──▶ DispatchingTool
//!            │
//!         end_turn
//!            ▼
//!          Done
//! ```
//!
//! `Done` is the only terminal state that yields a result. Every other exit
//! is an error: an unrecognised stop signal, an exhausted turn budget
//! ([`HighlightError::UnboundedLoop`]), cancellation, or a transport failure.
//!
//! ## Malformed tool calls
//!
//! By default a tool call with bad arguments is answered with a tool-error
//! result naming the problem and the loop continues, so one bad call cannot
//! sink the whole review. With `strict_tool_calls` the run aborts with
//! [`HighlightError::MalformedToolCall`] instead.

use crate::config::HighlightConfig;
use crate::error::{HighlightError, ToolCallError};
use crate::output::{ConversationOutcome, ConversationStats};
use crate::pipeline::conversation::{
    ContentBlock, ConversationState, ConversationTransport, RequestOptions, StopSignal,
    ToolInvocation, ToolSchema, Turn,
};
use crate::pipeline::highlight::{highlight_tool_schema, HighlightAccumulator, HIGHLIGHT_TOOL_NAME};
use crate::prompts::{compose_prompt, tool_error_message, DEFAULT_SYSTEM_PROMPT, TOOL_ACKNOWLEDGED};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the loop currently stands.
#[derive(Debug)]
enum Phase {
    AwaitingResponse,
    DispatchingTool(Vec<ToolInvocation>),
    Done(String),
}

/// Drives one conversation. Created per pipeline invocation.
pub struct Orchestrator<'a> {
    transport: &'a dyn ConversationTransport,
    config: &'a HighlightConfig,
    tools: Vec<ToolSchema>,
    options: RequestOptions,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(transport: &'a dyn ConversationTransport, config: &'a HighlightConfig) -> Self {
        let options = RequestOptions {
            system_prompt: Some(
                config
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };
        Self {
            transport,
            config,
            tools: vec![highlight_tool_schema()],
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop before the next agent turn once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the exchange to completion.
    ///
    /// `page_count` bounds `pageNumber` in tool calls when known.
    pub async fn run(
        &self,
        document: Arc<[u8]>,
        page_count: Option<usize>,
    ) -> Result<ConversationOutcome, HighlightError> {
        let prompt = compose_prompt(self.config.prompt.as_deref(), self.config.assumed_canvas);
        let mut state = ConversationState::new(Turn::document_prompt(document, prompt));
        let mut accumulator = match page_count {
            Some(n) => HighlightAccumulator::for_document(n),
            None => HighlightAccumulator::new(),
        };
        let mut stats = ConversationStats::default();
        let mut phase = Phase::AwaitingResponse;

        info!(
            "Starting conversation via {} (max {} turns)",
            self.transport.name(),
            self.config.max_turns
        );

        let summary = loop {
            phase = match phase {
                Phase::AwaitingResponse => self.await_response(&mut state, &mut stats).await?,
                Phase::DispatchingTool(calls) => {
                    let results = calls
                        .iter()
                        .map(|call| self.dispatch(call, &mut accumulator, &mut stats))
                        .collect::<Result<Vec<_>, _>>()?;
                    state.push_tool_results(results);
                    Phase::AwaitingResponse
                }
                Phase::Done(summary) => break summary,
            };
        };

        stats.turns = state.agent_turns();
        info!(
            "Conversation complete: {} turns, {} highlights accepted, {} rejected",
            stats.turns, stats.accepted_calls, stats.rejected_calls
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_conversation_complete(stats.turns, accumulator.len());
        }

        Ok(ConversationOutcome {
            summary,
            highlights: accumulator.into_records(),
            stats,
        })
    }

    /// `AwaitingResponse` step: one request, one classified reply.
    async fn await_response(
        &self,
        state: &mut ConversationState,
        stats: &mut ConversationStats,
    ) -> Result<Phase, HighlightError> {
        if self.cancel.is_cancelled() {
            return Err(HighlightError::Cancelled {
                completed_turns: state.agent_turns(),
            });
        }
        if state.agent_turns() >= self.config.max_turns {
            warn!(
                "Agent still working after {} turns; giving up",
                state.agent_turns()
            );
            return Err(HighlightError::UnboundedLoop {
                max_turns: self.config.max_turns,
            });
        }

        let turn = state.agent_turns() + 1;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_turn_start(turn);
        }

        let response = self
            .transport
            .send(state.turns(), &self.tools, &self.options)
            .await?;
        stats.input_tokens += response.usage.input_tokens;
        stats.output_tokens += response.usage.output_tokens;
        debug!(
            "Turn {}: stop={:?}, {} input tokens, {} output tokens",
            turn, response.stop, response.usage.input_tokens, response.usage.output_tokens
        );

        let stop = response.stop;
        state.push_agent(response.content);
        let last = state.last().ok_or_else(|| {
            HighlightError::Internal("conversation history is empty".to_string())
        })?;

        match stop {
            StopSignal::Completed => Ok(Phase::Done(last.text())),
            StopSignal::ToolUse => {
                let calls: Vec<ToolInvocation> = last.tool_invocations().cloned().collect();
                if calls.is_empty() {
                    return Err(HighlightError::MalformedResponse {
                        detail: format!("turn {turn} signalled tool use without a tool invocation"),
                    });
                }
                Ok(Phase::DispatchingTool(calls))
            }
            StopSignal::Other(signal) => Err(HighlightError::UnexpectedStopSignal { signal }),
        }
    }

    /// `DispatchingTool` step for one invocation; returns its result block.
    fn dispatch(
        &self,
        call: &ToolInvocation,
        accumulator: &mut HighlightAccumulator,
        stats: &mut ConversationStats,
    ) -> Result<ContentBlock, HighlightError> {
        stats.tool_calls += 1;

        let outcome = if call.name == HIGHLIGHT_TOOL_NAME {
            accumulator.accept(&call.arguments)
        } else {
            Err(ToolCallError::UnknownTool {
                name: call.name.clone(),
            })
        };

        match outcome {
            Ok(index) => {
                stats.accepted_calls += 1;
                if let Some(record) = accumulator.get(index) {
                    debug!(
                        "Accepted highlight #{} on page {}: {}",
                        index + 1,
                        record.page_number,
                        record.reason
                    );
                    if let Some(ref cb) = self.config.progress_callback {
                        cb.on_highlight_accepted(index, record);
                    }
                }
                Ok(ContentBlock::ToolResult {
                    call_id: call.id.clone(),
                    content: TOOL_ACKNOWLEDGED.to_string(),
                    is_error: false,
                })
            }
            Err(error) if self.config.strict_tool_calls => Err(HighlightError::MalformedToolCall {
                call_id: call.id.clone(),
                source: error,
            }),
            Err(error) => {
                stats.rejected_calls += 1;
                warn!("Rejected tool call {}: {}", call.id, error);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_tool_call_rejected(&call.id, &error);
                }
                Ok(ContentBlock::ToolResult {
                    call_id: call.id.clone(),
                    content: tool_error_message(&error.to_string()),
                    is_error: true,
                })
            }
        }
    }
}
