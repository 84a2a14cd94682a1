//! Error types for the edgequake-pdf-highlight library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`HighlightError`]: **Fatal**: the run cannot produce an artifact
//!   (wrong content type, empty object, agent never finished, transport
//!   exhausted its retries). Returned as `Err(HighlightError)` from the
//!   top-level `highlight*` functions.
//!
//! * [`ToolCallError`]: **Per call**: a single `highlight_pdf` invocation
//!   carried bad arguments. In the default (lenient) mode it is reported back
//!   to the agent as a tool-error turn and the conversation continues. In
//!   strict mode it is wrapped in [`HighlightError::MalformedToolCall`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf-highlight library.
#[derive(Debug, Error)]
pub enum HighlightError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The fetched object is not a PDF (declared content type or magic bytes).
    #[error("Object '{location}' is not a PDF document: {detail}")]
    InvalidInputFormat { location: String, detail: String },

    /// The fetched object contained no bytes.
    #[error("Object '{location}' is empty")]
    EmptyPayload { location: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF")]
    WrongPassword,

    /// A highlight targets a page the document does not have.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// A mapped rectangle cannot be drawn.
    #[error("Invalid highlight region on page {page}: {detail}")]
    InvalidRegion { page: usize, detail: String },

    /// pdfium-render failed while drawing or saving.
    #[error("Rendering failed: {detail}")]
    RenderFailed { detail: String },

    // ── Conversation errors ───────────────────────────────────────────────
    /// A tool call was malformed and strict mode is enabled.
    #[error("Malformed tool call '{call_id}': {source}")]
    MalformedToolCall {
        call_id: String,
        #[source]
        source: ToolCallError,
    },

    /// The agent did not signal completion within the turn budget.
    #[error("Agent did not finish within {max_turns} turns")]
    UnboundedLoop { max_turns: u32 },

    /// The agent stopped for a reason other than completion or tool use.
    #[error("Unexpected stop signal from agent: '{signal}'")]
    UnexpectedStopSignal { signal: String },

    /// The agent response contradicts its own stop signal.
    #[error("Malformed agent response: {detail}")]
    MalformedResponse { detail: String },

    /// The run was cancelled between turns; no artifact was produced.
    #[error("Cancelled after {completed_turns} completed turns")]
    Cancelled { completed_turns: u32 },

    // ── Transport errors ──────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The conversation transport failed after its own retries.
    #[error("Conversation transport failed: {message}")]
    TransportFailed { message: String },

    /// Provider returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// Provider returned an authentication error (401/403).
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Fetching or persisting an object failed.
    #[error("Storage {operation} failed for '{location}': {reason}")]
    StorageFailed {
        operation: StorageOperation,
        location: String,
        reason: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HighlightError {
    /// Whether a caller-side retry of the whole run could succeed.
    ///
    /// Only collaborator failures qualify. Input, PDF and conversation errors
    /// are deterministic for the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HighlightError::TransportFailed { .. }
                | HighlightError::RateLimitExceeded { .. }
                | HighlightError::StorageFailed { .. }
        )
    }
}

/// Which storage capability failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOperation {
    Fetch,
    Put,
}

impl std::fmt::Display for StorageOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageOperation::Fetch => f.write_str("fetch"),
            StorageOperation::Put => f.write_str("put"),
        }
    }
}

/// Rejection of a single tool invocation.
///
/// The `Display` text is what the agent sees in the tool-error turn, so it
/// names the offending field plainly.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ToolCallError {
    #[error("tool arguments must be a JSON object")]
    ArgumentsNotObject,

    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' must be a number")]
    NotANumber { field: String },

    #[error("field '{field}' must be a string")]
    NotAString { field: String },

    #[error("field '{field}' must be a finite number")]
    NotFinite { field: String },

    #[error("pageNumber must be an integer >= 1, got {value}")]
    InvalidPageNumber { value: f64 },

    #[error("pageNumber {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    #[error("field '{field}' must not be negative, got {value}")]
    NegativeExtent { field: String, value: f64 },

    #[error("reason must be non-empty text")]
    EmptyReason,
}
