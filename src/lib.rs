//! # edgequake-pdf-highlight
//!
//! Let a tool-using LLM agent review a PDF and draw its findings back onto
//! the document.
//!
//! ## Why this crate?
//!
//! Agents can read a PDF but cannot see its real page geometry. They reason
//! in an assumed canvas (US Letter by default, origin top-left) and call a
//! `highlight_pdf` tool with rectangles in that space. This crate runs the
//! conversation to completion, validates each tool call, maps every
//! rectangle onto the real page (origin bottom-left, per-axis scale) and
//! renders semi-transparent highlights with the agent's rationale beside
//! them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Fetch     ObjectStore::fetch, content-type + %PDF checks
//!  ├─ 2. Inspect   real page sizes via pdfium (spawn_blocking)
//!  ├─ 3. Converse  agent loop: AwaitingResponse ⇄ DispatchingTool → Done
//!  ├─ 4. Plan      map canvas regions onto pages (pure)
//!  ├─ 5. Render    fills + labels on a fresh parse of the original bytes
//!  └─ 6. Persist   ObjectStore::put at key + "_annotated"
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf_highlight::{highlight, HighlightConfig, LocalObjectStore, ObjectLocation};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Transport auto-resolved from ANTHROPIC_API_KEY
//!     let config = HighlightConfig::default();
//!     let store = LocalObjectStore::new("./data");
//!     let output = highlight(&ObjectLocation::new("docs", "a.pdf"), &store, &config).await?;
//!     println!("{}", output.summary);
//!     eprintln!("{} highlights → {}", output.highlights.len(), output.artifact);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-highlight` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf-highlight = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod highlight;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod storage;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{HighlightConfig, HighlightConfigBuilder, HighlightStyle, Rgb};
pub use error::{HighlightError, StorageOperation, ToolCallError};
pub use highlight::{highlight, highlight_bytes, highlight_sync, highlight_with_cancellation};
pub use output::{
    AnnotatedDocument, ConversationOutcome, ConversationStats, HighlightOutput, HighlightStats,
};
pub use pipeline::conversation::{ConversationTransport, ToolSchema};
pub use pipeline::coords::{map_region, AssumedCanvas, CanvasRegion, PageSize, PdfRegion};
pub use pipeline::highlight::{HighlightRecord, HIGHLIGHT_TOOL_NAME};
pub use pipeline::render::{DocumentEngine, PdfiumEngine};
pub use progress::{HighlightProgressCallback, NoopProgressCallback};
pub use storage::{
    HttpObjectStore, LocalObjectStore, MemoryObjectStore, ObjectLocation, ObjectStore,
};
pub use transport::{AnthropicConfig, AnthropicTransport};
