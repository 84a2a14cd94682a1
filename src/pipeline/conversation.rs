//! Provider-neutral conversation model and the transport capability.
//!
//! The orchestrator speaks in [`Turn`]s made of [`ContentBlock`]s. A
//! [`ConversationTransport`] translates them to whatever wire format the
//! backend uses and classifies each reply with a [`StopSignal`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::HighlightError;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One piece of a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    /// Raw document bytes, shared so that history clones stay cheap.
    Document { media_type: String, data: Arc<[u8]> },
    /// Agent asks to run a tool.
    ToolUse(ToolInvocation),
    /// Result of a tool run, echoing the invocation id.
    ToolResult {
        call_id: String,
        content: String,
        is_error: bool,
    },
}

/// A structured tool request emitted by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Opaque identifier, echoed back in the result turn.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// An ordered message in the conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Turn {
    /// Opening user turn: the document followed by the instruction prompt.
    pub fn document_prompt(document: Arc<[u8]>, prompt: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![
                ContentBlock::Document {
                    media_type: "application/pdf".to_string(),
                    data: document,
                },
                ContentBlock::Text(prompt.into()),
            ],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// Synthetic user turn carrying tool results.
    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolUse(call) => Some(call),
            _ => None,
        })
    }
}

/// Declared tool, JSON-schema shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Terminal indicator attached to an agent reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopSignal {
    /// Normal completion; the only success terminal.
    Completed,
    /// The reply carries one or more tool invocations.
    ToolUse,
    /// Anything else, verbatim (e.g. `max_tokens`). Fatal to the loop.
    Other(String),
}

impl StopSignal {
    /// Classify a wire-level stop reason.
    pub fn from_reason(reason: Option<&str>) -> Self {
        match reason {
            Some("end_turn") => StopSignal::Completed,
            Some("tool_use") => StopSignal::ToolUse,
            Some(other) => StopSignal::Other(other.to_string()),
            None => StopSignal::Other("<missing>".to_string()),
        }
    }
}

/// Token counts reported by the backend for one reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One reply from the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub content: Vec<ContentBlock>,
    pub stop: StopSignal,
    pub usage: TokenUsage,
}

/// Sampling parameters forwarded with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A conversational backend that understands tool use.
///
/// Implementations own their retry policy. An `Err` returned here is
/// treated as final by the orchestrator.
#[async_trait]
pub trait ConversationTransport: Send + Sync {
    /// Send the full history plus tool declarations and return the next reply.
    async fn send(
        &self,
        turns: &[Turn],
        tools: &[ToolSchema],
        options: &RequestOptions,
    ) -> Result<AgentResponse, HighlightError>;

    /// Short provider name for logs and errors.
    fn name(&self) -> &str;
}

/// Ordered history of one run.
///
/// Created once per pipeline invocation and dropped when the loop ends.
#[derive(Debug, Clone)]
pub struct ConversationState {
    turns: Vec<Turn>,
    agent_turns: u32,
}

impl ConversationState {
    pub fn new(opening: Turn) -> Self {
        Self {
            turns: vec![opening],
            agent_turns: 0,
        }
    }

    pub fn push_agent(&mut self, content: Vec<ContentBlock>) {
        self.turns.push(Turn::assistant(content));
        self.agent_turns += 1;
    }

    pub fn push_tool_results(&mut self, results: Vec<ContentBlock>) {
        self.turns.push(Turn::tool_results(results));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of agent replies received so far.
    pub fn agent_turns(&self) -> u32 {
        self.agent_turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}
