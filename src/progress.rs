//! Progress-callback trait for conversation and render events.
//!
//! Inject an [`Arc<dyn HighlightProgressCallback>`] via
//! [`crate::config::HighlightConfigBuilder::progress_callback`] to receive
//! events as the agent works through the document.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf_highlight::{HighlightConfig, HighlightProgressCallback, HighlightRecord};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     accepted: AtomicUsize,
//! }
//!
//! impl HighlightProgressCallback for CountingCallback {
//!     fn on_highlight_accepted(&self, _index: usize, record: &HighlightRecord) {
//!         let n = self.accepted.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("#{n} on page {}: {}", record.page_number, record.reason);
//!     }
//! }
//!
//! let config = HighlightConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { accepted: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::ToolCallError;
use crate::pipeline::highlight::HighlightRecord;
use crate::storage::ObjectLocation;
use std::sync::Arc;

/// Called by the pipeline as the conversation and render progress.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events for one run arrive sequentially.
pub trait HighlightProgressCallback: Send + Sync {
    /// Called once the document is fetched and inspected.
    fn on_conversation_start(&self, page_count: usize) {
        let _ = page_count;
    }

    /// Called before each request to the agent (1-based turn number).
    fn on_turn_start(&self, turn: u32) {
        let _ = turn;
    }

    /// Called after a tool call is validated and stored.
    fn on_highlight_accepted(&self, index: usize, record: &HighlightRecord) {
        let _ = (index, record);
    }

    /// Called when a tool call is rejected and reported back to the agent.
    fn on_tool_call_rejected(&self, call_id: &str, error: &ToolCallError) {
        let _ = (call_id, error);
    }

    /// Called when the agent signals completion.
    fn on_conversation_complete(&self, turns: u32, accepted: usize) {
        let _ = (turns, accepted);
    }

    /// Called after the annotated document has been persisted.
    fn on_render_complete(&self, artifact: &ObjectLocation) {
        let _ = artifact;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl HighlightProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::HighlightConfig`].
pub type ProgressCallback = Arc<dyn HighlightProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::coords::CanvasRegion;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        turns: AtomicUsize,
        accepted: AtomicUsize,
        rejected: AtomicUsize,
    }

    impl HighlightProgressCallback for TrackingCallback {
        fn on_turn_start(&self, _turn: u32) {
            self.turns.fetch_add(1, Ordering::SeqCst);
        }

        fn on_highlight_accepted(&self, _index: usize, _record: &HighlightRecord) {
            self.accepted.fetch_add(1, Ordering::SeqCst);
        }

        fn on_tool_call_rejected(&self, _call_id: &str, _error: &ToolCallError) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn record() -> HighlightRecord {
        HighlightRecord {
            page_number: 1,
            region: CanvasRegion {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            reason: "r".into(),
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversation_start(3);
        cb.on_turn_start(1);
        cb.on_highlight_accepted(0, &record());
        cb.on_tool_call_rejected("x", &ToolCallError::EmptyReason);
        cb.on_conversation_complete(2, 1);
        cb.on_render_complete(&ObjectLocation::new("b", "k"));
    }

    #[test]
    fn tracking_callback_receives_events() {
        let cb = TrackingCallback::default();
        cb.on_turn_start(1);
        cb.on_highlight_accepted(0, &record());
        cb.on_tool_call_rejected("t2", &ToolCallError::EmptyReason);
        cb.on_turn_start(2);
        assert_eq!(cb.turns.load(Ordering::SeqCst), 2);
        assert_eq!(cb.accepted.load(Ordering::SeqCst), 1);
        assert_eq!(cb.rejected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_conversation_start(10);
        cb.on_turn_start(1);
    }
}
