//! Pipeline driver: fetch → converse → render → persist.
//!
//! [`highlight`] is the primary entry point. [`highlight_bytes`] skips the
//! object store and returns the annotated bytes to the caller.
//!
//! Stages run strictly in sequence. The conversation needs the page count
//! to validate `pageNumber`, so pages are inspected once before the first
//! agent turn; the renderer later re-parses the original bytes fresh.

use crate::config::HighlightConfig;
use crate::error::HighlightError;
use crate::output::{AnnotatedDocument, ConversationOutcome, HighlightOutput, HighlightStats};
use crate::pipeline::conversation::ConversationTransport;
use crate::pipeline::document::{check_content_type, check_payload, Document, PDF_CONTENT_TYPE};
use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::render::{
    inspect_pages, plan_highlights, render_document, DocumentEngine, PdfiumEngine,
};
use crate::storage::{ObjectLocation, ObjectStore};
use crate::transport::AnthropicTransport;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Annotate the PDF at `source` and store the result next to it.
///
/// The artifact is written to the same bucket under the source key with
/// `config.output_suffix` inserted before the extension.
///
/// # Errors
/// Nothing is persisted when any stage fails. In particular a conversation
/// that exhausts `max_turns` returns [`HighlightError::UnboundedLoop`].
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf_highlight::{highlight, HighlightConfig, LocalObjectStore, ObjectLocation};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = LocalObjectStore::new("./data");
/// let source = ObjectLocation::new("contracts", "2024/lease.pdf");
/// let output = highlight(&source, &store, &HighlightConfig::default()).await?;
/// println!("{}", output.summary);
/// println!("annotated copy: {}", output.artifact);
/// # Ok(())
/// # }
/// ```
pub async fn highlight(
    source: &ObjectLocation,
    store: &dyn ObjectStore,
    config: &HighlightConfig,
) -> Result<HighlightOutput, HighlightError> {
    highlight_with_cancellation(source, store, config, CancellationToken::new()).await
}

/// [`highlight`] that stops before the next agent turn once `cancel` fires.
///
/// A cancelled run returns [`HighlightError::Cancelled`] and persists nothing.
pub async fn highlight_with_cancellation(
    source: &ObjectLocation,
    store: &dyn ObjectStore,
    config: &HighlightConfig,
    cancel: CancellationToken,
) -> Result<HighlightOutput, HighlightError> {
    let total_start = Instant::now();
    info!("Starting highlight run: {}", source);

    // ── Step 1: Fetch ────────────────────────────────────────────────────
    let object = store.fetch(source).await?;
    let location = source.to_string();
    check_content_type(object.content_type.as_deref(), &location)?;
    check_payload(&object.bytes, &location)?;
    info!("Fetched {} bytes from {}", object.bytes.len(), source);

    // ── Steps 2–3: Converse and render ───────────────────────────────────
    let document = Document::new(object.bytes);
    let annotated = annotate(document, config, cancel).await?;

    // ── Step 4: Persist ──────────────────────────────────────────────────
    let artifact = source.with_suffix(&config.output_suffix);
    store
        .put(&artifact, annotated.bytes, PDF_CONTENT_TYPE)
        .await?;
    info!("Persisted annotated PDF to {}", artifact);
    if let Some(ref cb) = config.progress_callback {
        cb.on_render_complete(&artifact);
    }

    let mut stats = annotated.stats;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    Ok(HighlightOutput {
        summary: annotated.summary,
        artifact,
        highlights: annotated.highlights,
        stats,
    })
}

/// Annotate in-memory PDF bytes without touching an object store.
pub async fn highlight_bytes(
    bytes: impl Into<Arc<[u8]>>,
    config: &HighlightConfig,
) -> Result<AnnotatedDocument, HighlightError> {
    let document = Document::new(bytes);
    check_payload(document.bytes(), "<memory>")?;
    annotate(document, config, CancellationToken::new()).await
}

/// Synchronous wrapper around [`highlight`].
///
/// Creates a temporary tokio runtime internally.
pub fn highlight_sync(
    source: &ObjectLocation,
    store: &dyn ObjectStore,
    config: &HighlightConfig,
) -> Result<HighlightOutput, HighlightError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| HighlightError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(highlight(source, store, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Converse over `document`, then render the accepted highlights onto a
/// fresh parse of the same bytes.
async fn annotate(
    document: Document,
    config: &HighlightConfig,
    cancel: CancellationToken,
) -> Result<AnnotatedDocument, HighlightError> {
    let start = Instant::now();
    let transport = resolve_transport(config)?;
    let engine = resolve_engine(config);
    let document = Arc::new(document);
    let input_bytes = document.len();

    let pages = inspect_pages(
        Arc::clone(&engine),
        Arc::clone(&document),
        config.password.clone(),
    )
    .await?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversation_start(pages.len());
    }

    let conversation_start = Instant::now();
    let ConversationOutcome {
        summary,
        highlights,
        stats: conversation,
    } = Orchestrator::new(transport.as_ref(), config)
        .with_cancellation(cancel)
        .run(Arc::clone(document.bytes()), Some(pages.len()))
        .await?;
    let conversation_duration_ms = conversation_start.elapsed().as_millis() as u64;

    let render_start = Instant::now();
    let plan = plan_highlights(
        &highlights,
        &pages,
        config.assumed_canvas,
        &config.style,
        config.clamp_to_page,
    )?;
    debug!("Render plan: {} draw operations", plan.len());
    let bytes = render_document(
        engine,
        Arc::clone(document.bytes()),
        config.password.clone(),
        plan,
    )
    .await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} highlights across {} pages in {}ms",
        highlights.len(),
        pages.len(),
        render_duration_ms
    );

    let stats = HighlightStats {
        page_count: pages.len(),
        conversation,
        input_bytes,
        output_bytes: bytes.len(),
        conversation_duration_ms,
        render_duration_ms,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };

    Ok(AnnotatedDocument {
        bytes,
        summary,
        highlights,
        stats,
    })
}

/// Injected transport first, then the Anthropic adapter from the environment.
fn resolve_transport(
    config: &HighlightConfig,
) -> Result<Arc<dyn ConversationTransport>, HighlightError> {
    if let Some(ref transport) = config.transport {
        return Ok(Arc::clone(transport));
    }
    Ok(Arc::new(AnthropicTransport::from_env()?))
}

fn resolve_engine(config: &HighlightConfig) -> Arc<dyn DocumentEngine> {
    match config.engine {
        Some(ref engine) => Arc::clone(engine),
        None => Arc::new(PdfiumEngine::new()),
    }
}
