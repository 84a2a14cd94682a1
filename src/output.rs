//! Result types returned by the pipeline.

use crate::pipeline::highlight::HighlightRecord;
use crate::storage::ObjectLocation;
use serde::{Deserialize, Serialize};

/// What the orchestrator hands to the renderer once the agent is done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationOutcome {
    /// Final natural-language summary from the agent.
    pub summary: String,
    /// Accepted highlights in acceptance order.
    pub highlights: Vec<HighlightRecord>,
    pub stats: ConversationStats,
}

/// Counters for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStats {
    /// Agent replies received, including the final one.
    pub turns: u32,
    /// Tool invocations seen across all replies.
    pub tool_calls: usize,
    pub accepted_calls: usize,
    pub rejected_calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Result of a full fetch → converse → render → persist run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightOutput {
    pub summary: String,
    /// Where the annotated PDF was written.
    pub artifact: ObjectLocation,
    pub highlights: Vec<HighlightRecord>,
    pub stats: HighlightStats,
}

/// Timing and volume statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HighlightStats {
    pub page_count: usize,
    pub conversation: ConversationStats,
    pub input_bytes: usize,
    pub output_bytes: usize,
    pub conversation_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of [`crate::highlight_bytes`]: the annotated bytes stay in memory.
#[derive(Debug, Clone)]
pub struct AnnotatedDocument {
    pub bytes: Vec<u8>,
    pub summary: String,
    pub highlights: Vec<HighlightRecord>,
    pub stats: HighlightStats,
}
