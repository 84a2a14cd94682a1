//! Coordinate mapping from the agent's canvas to real PDF page space.
//!
//! The agent cannot see real page geometry, so it reasons in a fixed
//! [`AssumedCanvas`] (US Letter, 612×792 pt by default) with the origin at
//! the **top-left**. PDF user space has its origin at the **bottom-left** and
//! every page has its own size.
//!
//! ```text
//!   agent canvas (Wa × Ha)            real page (W × H)
//!   (0,0) ┌──────────┐                ┌──────────┐ (W,H)
//!         │  ┌──┐ y  │    scale +     │  ┌──┐    │
//!         │  └──┘    │  ───────────▶  │  └──┘ y' │
//!         └──────────┘                └──────────┘
//!                                   (0,0)
//! ```
//!
//! The flip is applied exactly once, after scaling:
//! `y' = H - (y + h) * (H / Ha)`. This module has no I/O and no rendering
//! dependency.

use serde::{Deserialize, Serialize};

/// Reference page size the agent uses when proposing coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssumedCanvas {
    pub width: f64,
    pub height: f64,
}

impl AssumedCanvas {
    /// US Letter in points.
    pub const LETTER: AssumedCanvas = AssumedCanvas {
        width: 612.0,
        height: 792.0,
    };

    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Both dimensions are finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

impl Default for AssumedCanvas {
    fn default() -> Self {
        Self::LETTER
    }
}

/// Real size of one PDF page in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A rectangle in agent canvas space (origin top-left, `y` grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A rectangle in PDF user space (origin bottom-left, `y` is the bottom edge).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRegion {
    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    /// Intersect with the page box `[0, W] × [0, H]`.
    ///
    /// A rectangle entirely off the page collapses to zero width or height.
    pub fn clamp_to(&self, page: PageSize) -> PdfRegion {
        let left = self.left().clamp(0.0, page.width);
        let right = self.right().clamp(0.0, page.width);
        let bottom = self.bottom().clamp(0.0, page.height);
        let top = self.top().clamp(0.0, page.height);
        PdfRegion {
            x: left,
            y: bottom,
            width: (right - left).max(0.0),
            height: (top - bottom).max(0.0),
        }
    }
}

/// Per-axis scale factors between the canvas and a real page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    pub fn between(canvas: AssumedCanvas, page: PageSize) -> Self {
        Self {
            x: page.width / canvas.width,
            y: page.height / canvas.height,
        }
    }
}

/// Why a region could not be mapped.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingError {
    /// Canvas has a zero, negative or non-finite dimension.
    InvalidCanvas,
    /// Mapped width or height came out negative.
    NegativeExtent { width: f64, height: f64 },
    /// A mapped coordinate is NaN or infinite.
    NonFinite,
}

impl std::fmt::Display for MappingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingError::InvalidCanvas => f.write_str("assumed canvas must have positive finite size"),
            MappingError::NegativeExtent { width, height } => {
                write!(f, "mapped extent is negative ({width} x {height})")
            }
            MappingError::NonFinite => f.write_str("mapped coordinates are not finite"),
        }
    }
}

/// Translate a canvas-space region onto a real page.
///
/// Scales each axis independently, then flips the vertical origin once.
/// No clamping is performed; see [`PdfRegion::clamp_to`].
pub fn map_region(
    region: CanvasRegion,
    canvas: AssumedCanvas,
    page: PageSize,
) -> Result<PdfRegion, MappingError> {
    if !canvas.is_valid() {
        return Err(MappingError::InvalidCanvas);
    }

    let scale = Scale::between(canvas, page);
    let width = region.width * scale.x;
    let height = region.height * scale.y;

    let mapped = PdfRegion {
        x: region.x * scale.x,
        y: page.height - (region.y + region.height) * scale.y,
        width,
        height,
    };

    if ![mapped.x, mapped.y, mapped.width, mapped.height]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(MappingError::NonFinite);
    }
    if width < 0.0 || height < 0.0 {
        return Err(MappingError::NegativeExtent { width, height });
    }

    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn region(x: f64, y: f64, width: f64, height: f64) -> CanvasRegion {
        CanvasRegion {
            x,
            y,
            width,
            height,
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < EPS, "{a} != {b}");
    }

    #[test]
    fn identity_page_only_flips() {
        let mapped = map_region(
            region(100.0, 50.0, 200.0, 30.0),
            AssumedCanvas::LETTER,
            PageSize::new(612.0, 792.0),
        )
        .unwrap();
        assert_close(mapped.x, 100.0);
        assert_close(mapped.width, 200.0);
        assert_close(mapped.height, 30.0);
        assert_close(mapped.y, 792.0 - 80.0);
    }

    #[test]
    fn double_sized_page_matches_worked_example() {
        let mapped = map_region(
            region(100.0, 50.0, 200.0, 30.0),
            AssumedCanvas::LETTER,
            PageSize::new(1224.0, 1584.0),
        )
        .unwrap();
        assert_close(mapped.x, 200.0);
        assert_close(mapped.width, 400.0);
        assert_close(mapped.height, 60.0);
        assert_close(mapped.y, 1424.0);
    }

    #[test]
    fn top_edge_touches_page_top_for_any_width() {
        // y = 0 in agent space is the top of the page: the flip happens once.
        for &(w, h) in &[
            (612.0, 792.0),
            (595.0, 792.0),
            (1224.0, 792.0),
            (300.0, 792.0),
        ] {
            let page = PageSize::new(w, h);
            let mapped = map_region(region(10.0, 0.0, 50.0, 40.0), AssumedCanvas::LETTER, page).unwrap();
            assert_close(mapped.top(), h);
        }
    }

    #[test]
    fn top_edge_scales_with_non_default_heights() {
        // Flipping before scaling, or twice, drifts as H diverges from Ha.
        for &(w, h) in &[(595.0, 842.0), (842.0, 595.0), (1224.0, 1584.0), (200.0, 3000.0)] {
            let page = PageSize::new(w, h);
            let y = 120.0;
            let height = 30.0;
            let mapped =
                map_region(region(0.0, y, 10.0, height), AssumedCanvas::LETTER, page).unwrap();
            let scale_y = h / 792.0;
            assert_close(mapped.top(), h - y * scale_y);
            assert_close(mapped.bottom(), h - (y + height) * scale_y);
        }
    }

    #[test]
    fn bottom_of_canvas_maps_to_page_bottom() {
        let page = PageSize::new(842.0, 1191.0);
        let mapped =
            map_region(region(0.0, 742.0, 612.0, 50.0), AssumedCanvas::LETTER, page).unwrap();
        assert_close(mapped.bottom(), 0.0);
        assert_close(mapped.right(), 842.0);
    }

    #[test]
    fn axes_scale_independently() {
        let page = PageSize::new(1000.0, 1000.0);
        let narrow = Scale::between(AssumedCanvas::new(500.0, 800.0), page);
        let wide = Scale::between(AssumedCanvas::new(1000.0, 800.0), page);
        assert_close(wide.x, narrow.x / 2.0);
        assert_close(wide.y, narrow.y);
    }

    #[test]
    fn negative_extent_is_rejected() {
        let err = map_region(
            region(10.0, 10.0, -5.0, 20.0),
            AssumedCanvas::LETTER,
            PageSize::new(612.0, 792.0),
        )
        .unwrap_err();
        assert!(matches!(err, MappingError::NegativeExtent { .. }));
    }

    #[test]
    fn degenerate_canvas_is_rejected() {
        let err = map_region(
            region(0.0, 0.0, 1.0, 1.0),
            AssumedCanvas::new(0.0, 792.0),
            PageSize::new(612.0, 792.0),
        )
        .unwrap_err();
        assert_eq!(err, MappingError::InvalidCanvas);
    }

    #[test]
    fn clamp_trims_overhang() {
        let page = PageSize::new(612.0, 792.0);
        let r = PdfRegion {
            x: -10.0,
            y: 780.0,
            width: 100.0,
            height: 40.0,
        };
        let c = r.clamp_to(page);
        assert_close(c.x, 0.0);
        assert_close(c.width, 90.0);
        assert_close(c.top(), 792.0);
        assert_close(c.height, 12.0);
    }

    #[test]
    fn clamp_off_page_collapses() {
        let page = PageSize::new(612.0, 792.0);
        let r = PdfRegion {
            x: 700.0,
            y: 10.0,
            width: 50.0,
            height: 10.0,
        };
        assert_close(r.clamp_to(page).width, 0.0);
    }
}
