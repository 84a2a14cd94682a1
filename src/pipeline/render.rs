//! Annotation rendering: plan the drawing, then apply it with pdfium.
//!
//! Rendering is split in two:
//!
//! 1. [`plan_highlights`]: pure. Resolves each record's page, maps its
//!    region through [`crate::pipeline::coords::map_region`] and emits
//!    [`DrawOp`]s in accumulation order. The same records and page sizes
//!    always give the same plan.
//! 2. [`DocumentEngine::apply`]: executes a plan against fresh bytes and
//!    serialises the result. [`PdfiumEngine`] is the production backend.
//!
//! pdfium is not async-safe, so [`inspect_pages`] and [`render_document`]
//! run the engine inside `spawn_blocking`.
//!
//! A record whose page is out of range aborts the whole render with
//! [`HighlightError::PageOutOfRange`]; no partially annotated document is
//! produced.

use crate::config::{HighlightStyle, Rgb};
use crate::error::HighlightError;
use crate::pipeline::coords::{map_region, AssumedCanvas, PageSize, PdfRegion};
use crate::pipeline::highlight::HighlightRecord;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Average Helvetica glyph advance as a fraction of the font size.
const AVG_GLYPH_EM: f32 = 0.5;

/// Marker appended to truncated labels.
const ELLIPSIS: &str = "...";

/// One drawing instruction against a 0-based page.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Semi-transparent filled rectangle.
    Fill {
        page_index: usize,
        rect: PdfRegion,
        color: Rgb,
        alpha: u8,
    },
    /// Single-line rationale text; `y` is the baseline.
    Label {
        page_index: usize,
        x: f64,
        y: f64,
        text: String,
        font_size: f32,
        color: Rgb,
    },
}

impl DrawOp {
    pub fn page_index(&self) -> usize {
        match self {
            DrawOp::Fill { page_index, .. } | DrawOp::Label { page_index, .. } => *page_index,
        }
    }
}

/// Ordered drawing instructions for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPlan {
    pub ops: Vec<DrawOp>,
}

impl RenderPlan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Turn accepted records into drawing instructions.
///
/// Each record yields a `Fill`, followed by a `Label` when its reason is
/// non-empty. The label sits at the left margin of the page with its
/// baseline on the rectangle's top edge.
pub fn plan_highlights(
    records: &[HighlightRecord],
    pages: &[PageSize],
    canvas: AssumedCanvas,
    style: &HighlightStyle,
    clamp: bool,
) -> Result<RenderPlan, HighlightError> {
    let mut ops = Vec::with_capacity(records.len() * 2);

    for record in records {
        let page = record.page_number;
        if page == 0 || page > pages.len() {
            return Err(HighlightError::PageOutOfRange {
                page,
                total: pages.len(),
            });
        }
        let page_index = page - 1;
        let page_size = pages[page_index];

        let mut rect = map_region(record.region, canvas, page_size).map_err(|e| {
            HighlightError::InvalidRegion {
                page,
                detail: e.to_string(),
            }
        })?;
        if clamp {
            rect = rect.clamp_to(page_size);
        }

        ops.push(DrawOp::Fill {
            page_index,
            rect,
            color: style.fill,
            alpha: style.fill_alpha(),
        });

        if !record.reason.is_empty() {
            ops.push(DrawOp::Label {
                page_index,
                x: style.label_margin as f64,
                y: rect.top(),
                text: truncate_label(&record.reason, style.font_size, style.max_label_width),
                font_size: style.font_size,
                color: style.label_color,
            });
        }
    }

    Ok(RenderPlan { ops })
}

/// Cut `text` so it fits in `max_width` points on a single line.
pub fn truncate_label(text: &str, font_size: f32, max_width: f32) -> String {
    let single_line: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let max_chars = (max_width / (font_size * AVG_GLYPH_EM)).floor().max(0.0) as usize;
    let len = single_line.chars().count();
    if len <= max_chars {
        return single_line;
    }
    if max_chars <= ELLIPSIS.len() {
        return single_line.chars().take(max_chars).collect();
    }
    let mut out: String = single_line.chars().take(max_chars - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Backend that reads page geometry and applies render plans.
///
/// Methods are blocking; callers move them off the async executor.
pub trait DocumentEngine: Send + Sync {
    /// Real page sizes in points, in page order.
    fn inspect(&self, bytes: &[u8], password: Option<&str>) -> Result<Vec<PageSize>, HighlightError>;

    /// Parse `bytes` fresh, execute `plan` and serialise the result.
    fn apply(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        plan: &RenderPlan,
    ) -> Result<Vec<u8>, HighlightError>;
}

/// Read page sizes on the blocking pool.
pub async fn inspect_pages(
    engine: Arc<dyn DocumentEngine>,
    document: Arc<crate::pipeline::document::Document>,
    password: Option<String>,
) -> Result<Vec<PageSize>, HighlightError> {
    tokio::task::spawn_blocking(move || {
        document
            .pages(engine.as_ref(), password.as_deref())
            .map(|pages| pages.to_vec())
    })
    .await
    .map_err(|e| HighlightError::Internal(format!("Inspect task panicked: {}", e)))?
}

/// Apply `plan` to `bytes` on the blocking pool.
pub async fn render_document(
    engine: Arc<dyn DocumentEngine>,
    bytes: Arc<[u8]>,
    password: Option<String>,
    plan: RenderPlan,
) -> Result<Vec<u8>, HighlightError> {
    tokio::task::spawn_blocking(move || engine.apply(&bytes, password.as_deref(), &plan))
        .await
        .map_err(|e| HighlightError::Internal(format!("Render task panicked: {}", e)))?
}

/// [`DocumentEngine`] backed by pdfium-render.
///
/// Binds `PDFIUM_LIB_PATH` when set, then a library in the working
/// directory, then the system library. Each call binds its own instance.
#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    library_path: Option<PathBuf>,
}

impl PdfiumEngine {
    pub fn new() -> Self {
        Self {
            library_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
        }
    }

    /// Use the pdfium library at `path` only.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    /// Bind a pdfium instance.
    pub fn bind(&self) -> Result<Pdfium, HighlightError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| HighlightError::PdfiumBindingFailed(format!("{e}")))?;
        Ok(Pdfium::new(bindings))
    }

    fn load<'a>(
        pdfium: &'a Pdfium,
        bytes: &'a [u8],
        password: Option<&'a str>,
    ) -> Result<PdfDocument<'a>, HighlightError> {
        pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    HighlightError::WrongPassword
                } else {
                    HighlightError::PasswordRequired
                }
            } else {
                HighlightError::CorruptPdf { detail: err_str }
            }
        })
    }
}

fn render_failed(e: PdfiumError) -> HighlightError {
    HighlightError::RenderFailed {
        detail: format!("{:?}", e),
    }
}

fn pdf_color(color: Rgb, alpha: u8) -> PdfColor {
    PdfColor::new(color.0, color.1, color.2, alpha)
}

impl DocumentEngine for PdfiumEngine {
    fn inspect(&self, bytes: &[u8], password: Option<&str>) -> Result<Vec<PageSize>, HighlightError> {
        let pdfium = self.bind()?;
        let document = Self::load(&pdfium, bytes, password)?;
        let pages: Vec<PageSize> = document
            .pages()
            .iter()
            .map(|page| PageSize::new(page.width().value as f64, page.height().value as f64))
            .collect();
        info!("PDF loaded: {} pages", pages.len());
        Ok(pages)
    }

    fn apply(
        &self,
        bytes: &[u8],
        password: Option<&str>,
        plan: &RenderPlan,
    ) -> Result<Vec<u8>, HighlightError> {
        let pdfium = self.bind()?;
        let mut document = Self::load(&pdfium, bytes, password)?;
        let font = document.fonts_mut().helvetica();
        let total = document.pages().len() as usize;

        for op in &plan.ops {
            let index = op.page_index();
            if index >= total {
                return Err(HighlightError::PageOutOfRange {
                    page: index + 1,
                    total,
                });
            }
            let mut page = document.pages().get(index as u16).map_err(render_failed)?;

            match op {
                DrawOp::Fill {
                    rect, color, alpha, ..
                } => {
                    let bounds = PdfRect::new_from_values(
                        rect.bottom() as f32,
                        rect.left() as f32,
                        rect.top() as f32,
                        rect.right() as f32,
                    );
                    page.objects_mut()
                        .create_path_object_rect(bounds, None, None, Some(pdf_color(*color, *alpha)))
                        .map_err(render_failed)?;
                }
                DrawOp::Label {
                    x,
                    y,
                    text,
                    font_size,
                    color,
                    ..
                } => {
                    let mut label =
                        PdfPageTextObject::new(&document, text, font, PdfPoints::new(*font_size))
                            .map_err(render_failed)?;
                    label
                        .set_fill_color(pdf_color(*color, 255))
                        .map_err(render_failed)?;
                    label
                        .translate(PdfPoints::new(*x as f32), PdfPoints::new(*y as f32))
                        .map_err(render_failed)?;
                    page.objects_mut()
                        .add_text_object(label)
                        .map_err(render_failed)?;
                }
            }
            debug!("Applied {:?} to page {}", op, index + 1);
        }

        document.save_to_bytes().map_err(render_failed)
    }
}
