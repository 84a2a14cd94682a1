//! The source document: raw bytes plus lazily inspected page geometry.
//!
//! Bytes are validated before any conversation starts so that a wrong object
//! never costs a model call. Page sizes are read once, on first request,
//! through whichever [`DocumentEngine`] the run is configured with.

use crate::error::HighlightError;
use crate::pipeline::coords::PageSize;
use crate::pipeline::render::DocumentEngine;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::debug;

/// MIME type the pipeline accepts.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Magic bytes every PDF starts with.
const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Reject a declared content type other than `application/pdf`.
///
/// Parameters (`; charset=...`) and case are ignored. An absent content type
/// is accepted here; the magic-byte check in [`check_payload`] decides.
pub fn check_content_type(declared: Option<&str>, location: &str) -> Result<(), HighlightError> {
    let Some(declared) = declared else {
        return Ok(());
    };
    let essence = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence == PDF_CONTENT_TYPE {
        Ok(())
    } else {
        Err(HighlightError::InvalidInputFormat {
            location: location.to_string(),
            detail: format!("content type is '{declared}', expected '{PDF_CONTENT_TYPE}'"),
        })
    }
}

/// Reject empty payloads and bytes that do not start with `%PDF`.
pub fn check_payload(bytes: &[u8], location: &str) -> Result<(), HighlightError> {
    if bytes.is_empty() {
        return Err(HighlightError::EmptyPayload {
            location: location.to_string(),
        });
    }
    if bytes.len() < PDF_MAGIC.len() || &bytes[..PDF_MAGIC.len()] != PDF_MAGIC {
        let head: Vec<u8> = bytes.iter().take(PDF_MAGIC.len()).copied().collect();
        return Err(HighlightError::InvalidInputFormat {
            location: location.to_string(),
            detail: format!("first bytes are {head:?}, expected %PDF"),
        });
    }
    Ok(())
}

/// Immutable PDF bytes with cached page geometry.
#[derive(Debug)]
pub struct Document {
    bytes: Arc<[u8]>,
    pages: OnceCell<Vec<PageSize>>,
}

impl Document {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
            pages: OnceCell::new(),
        }
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Page sizes, inspected on first call. Blocking.
    pub fn pages(
        &self,
        engine: &dyn DocumentEngine,
        password: Option<&str>,
    ) -> Result<&[PageSize], HighlightError> {
        let pages = self.pages.get_or_try_init(|| {
            let pages = engine.inspect(&self.bytes, password)?;
            debug!("Inspected document: {} pages", pages.len());
            Ok::<_, HighlightError>(pages)
        })?;
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::RenderPlan;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEngine {
        calls: AtomicUsize,
    }

    impl DocumentEngine for CountingEngine {
        fn inspect(&self, _bytes: &[u8], _password: Option<&str>) -> Result<Vec<PageSize>, HighlightError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![PageSize::new(612.0, 792.0); 2])
        }

        fn apply(
            &self,
            bytes: &[u8],
            _password: Option<&str>,
            _plan: &RenderPlan,
        ) -> Result<Vec<u8>, HighlightError> {
            Ok(bytes.to_vec())
        }
    }

    #[test]
    fn content_type_essence_is_compared() {
        assert!(check_content_type(Some("application/pdf"), "b/k").is_ok());
        assert!(check_content_type(Some("Application/PDF; qs=0.9"), "b/k").is_ok());
        assert!(check_content_type(None, "b/k").is_ok());
        let err = check_content_type(Some("text/html"), "b/k").unwrap_err();
        assert!(matches!(err, HighlightError::InvalidInputFormat { .. }));
    }

    #[test]
    fn empty_payload_is_distinct() {
        assert!(matches!(
            check_payload(b"", "b/k").unwrap_err(),
            HighlightError::EmptyPayload { .. }
        ));
    }

    #[test]
    fn wrong_magic_is_invalid_format() {
        assert!(matches!(
            check_payload(b"PK\x03\x04zip", "b/k").unwrap_err(),
            HighlightError::InvalidInputFormat { .. }
        ));
        assert!(matches!(
            check_payload(b"%P", "b/k").unwrap_err(),
            HighlightError::InvalidInputFormat { .. }
        ));
        assert!(check_payload(b"%PDF-1.4\n", "b/k").is_ok());
    }

    #[test]
    fn pages_are_inspected_once() {
        let engine = CountingEngine {
            calls: AtomicUsize::new(0),
        };
        let doc = Document::new(b"%PDF-1.7".to_vec());
        assert_eq!(doc.pages(&engine, None).unwrap().len(), 2);
        assert_eq!(doc.pages(&engine, None).unwrap().len(), 2);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }
}
