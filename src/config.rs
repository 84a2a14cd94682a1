//! Configuration types for a highlight run.
//!
//! All run behaviour is controlled through [`HighlightConfig`], built via
//! its [`HighlightConfigBuilder`]. Collaborators (transport, PDF engine,
//! progress callback) are injected here as trait objects; when absent they
//! are resolved from the environment at run time.

use crate::error::HighlightError;
use crate::pipeline::conversation::ConversationTransport;
use crate::pipeline::coords::AssumedCanvas;
use crate::pipeline::render::DocumentEngine;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for one annotate-and-persist run.
///
/// # Example
/// ```rust
/// use edgequake_pdf_highlight::{AssumedCanvas, HighlightConfig};
///
/// let config = HighlightConfig::builder()
///     .assumed_canvas(AssumedCanvas::new(595.0, 842.0))
///     .max_turns(10)
///     .strict_tool_calls(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_turns, 10);
/// ```
#[derive(Clone)]
pub struct HighlightConfig {
    /// Canvas the agent reasons in. Default: 612×792 (US Letter).
    pub assumed_canvas: AssumedCanvas,

    /// Maximum agent replies before the run fails with
    /// [`HighlightError::UnboundedLoop`]. Default: 25.
    pub max_turns: u32,

    /// Abort the run on the first malformed tool call instead of reporting
    /// it back to the agent. Default: false.
    pub strict_tool_calls: bool,

    /// Clamp mapped rectangles to the page box before drawing. Default: false.
    pub clamp_to_page: bool,

    /// Instruction prompt. If None, uses [`crate::prompts::DEFAULT_HIGHLIGHT_PROMPT`].
    pub prompt: Option<String>,

    /// System prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Inserted before the extension of the source key. Default: `_annotated`.
    pub output_suffix: String,

    /// Presentation of highlights and labels.
    pub style: HighlightStyle,

    /// Model identifier forwarded to the transport. If None, transport default.
    pub model: Option<String>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens per agent reply. Default: 4096.
    pub max_tokens: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Pre-constructed conversation transport. If None, resolved from
    /// `ANTHROPIC_API_KEY`.
    pub transport: Option<Arc<dyn ConversationTransport>>,

    /// PDF backend. If None, uses [`crate::pipeline::render::PdfiumEngine`].
    pub engine: Option<Arc<dyn DocumentEngine>>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            assumed_canvas: AssumedCanvas::default(),
            max_turns: 25,
            strict_tool_calls: false,
            clamp_to_page: false,
            prompt: None,
            system_prompt: None,
            output_suffix: "_annotated".to_string(),
            style: HighlightStyle::default(),
            model: None,
            temperature: 0.0,
            max_tokens: 4096,
            password: None,
            transport: None,
            engine: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for HighlightConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HighlightConfig")
            .field("assumed_canvas", &self.assumed_canvas)
            .field("max_turns", &self.max_turns)
            .field("strict_tool_calls", &self.strict_tool_calls)
            .field("clamp_to_page", &self.clamp_to_page)
            .field("output_suffix", &self.output_suffix)
            .field("style", &self.style)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "transport",
                &self.transport.as_ref().map(|t| t.name().to_string()),
            )
            .field("engine", &self.engine.as_ref().map(|_| "<dyn DocumentEngine>"))
            .finish()
    }
}

impl HighlightConfig {
    /// Create a new builder for `HighlightConfig`.
    pub fn builder() -> HighlightConfigBuilder {
        HighlightConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`HighlightConfig`].
pub struct HighlightConfigBuilder {
    config: HighlightConfig,
}

impl HighlightConfigBuilder {
    pub fn assumed_canvas(mut self, canvas: AssumedCanvas) -> Self {
        self.config.assumed_canvas = canvas;
        self
    }

    pub fn max_turns(mut self, n: u32) -> Self {
        self.config.max_turns = n;
        self
    }

    pub fn strict_tool_calls(mut self, v: bool) -> Self {
        self.config.strict_tool_calls = v;
        self
    }

    pub fn clamp_to_page(mut self, v: bool) -> Self {
        self.config.clamp_to_page = v;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn output_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.output_suffix = suffix.into();
        self
    }

    pub fn style(mut self, style: HighlightStyle) -> Self {
        self.config.style = style;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 1.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ConversationTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn DocumentEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<HighlightConfig, HighlightError> {
        let c = &self.config;
        if !c.assumed_canvas.is_valid() {
            return Err(HighlightError::InvalidConfig(format!(
                "Assumed canvas must be positive and finite, got {}x{}",
                c.assumed_canvas.width, c.assumed_canvas.height
            )));
        }
        if c.max_turns == 0 {
            return Err(HighlightError::InvalidConfig("max_turns must be ≥ 1".into()));
        }
        if c.max_tokens == 0 {
            return Err(HighlightError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.output_suffix.is_empty() {
            return Err(HighlightError::InvalidConfig(
                "output_suffix must not be empty".into(),
            ));
        }
        c.style.validate()?;
        Ok(self.config)
    }
}

/// RGB colour, 0–255 per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Presentation policy for rendered highlights. Constant within one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighlightStyle {
    /// Fill colour. Default: yellow.
    pub fill: Rgb,
    /// Fill opacity in `[0, 1]`. Default: 0.35.
    pub opacity: f32,
    /// Label text colour. Default: dark red.
    pub label_color: Rgb,
    /// Label font size in points. Default: 8.
    pub font_size: f32,
    /// Distance of the label from the left page edge. Default: 10 pt.
    pub label_margin: f32,
    /// Labels longer than this are truncated, never wrapped. Default: 180 pt.
    pub max_label_width: f32,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            fill: Rgb(255, 235, 59),
            opacity: 0.35,
            label_color: Rgb(183, 28, 28),
            font_size: 8.0,
            label_margin: 10.0,
            max_label_width: 180.0,
        }
    }
}

impl HighlightStyle {
    /// Fill alpha channel derived from `opacity`.
    pub fn fill_alpha(&self) -> u8 {
        (self.opacity.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    fn validate(&self) -> Result<(), HighlightError> {
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(HighlightError::InvalidConfig(format!(
                "Highlight opacity must be 0–1, got {}",
                self.opacity
            )));
        }
        if !(self.font_size > 0.0) {
            return Err(HighlightError::InvalidConfig(format!(
                "Label font size must be > 0, got {}",
                self.font_size
            )));
        }
        if !(self.max_label_width > 0.0) {
            return Err(HighlightError::InvalidConfig(format!(
                "Maximum label width must be > 0, got {}",
                self.max_label_width
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = HighlightConfig::default();
        assert_eq!(c.assumed_canvas, AssumedCanvas::LETTER);
        assert_eq!(c.max_turns, 25);
        assert!(!c.strict_tool_calls);
        assert_eq!(c.output_suffix, "_annotated");
        assert_eq!(c.style.fill_alpha(), 89);
    }

    #[test]
    fn zero_turns_rejected() {
        let err = HighlightConfig::builder().max_turns(0).build().unwrap_err();
        assert!(matches!(err, HighlightError::InvalidConfig(_)));
    }

    #[test]
    fn degenerate_canvas_rejected() {
        let err = HighlightConfig::builder()
            .assumed_canvas(AssumedCanvas::new(612.0, 0.0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("canvas"));
    }

    #[test]
    fn bad_opacity_rejected() {
        let style = HighlightStyle {
            opacity: 1.5,
            ..HighlightStyle::default()
        };
        assert!(HighlightConfig::builder().style(style).build().is_err());
    }

    #[test]
    fn empty_suffix_rejected() {
        assert!(HighlightConfig::builder().output_suffix("").build().is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = HighlightConfig::builder().temperature(3.0).build().unwrap();
        assert_eq!(c.temperature, 1.0);
    }

    #[test]
    fn debug_hides_trait_objects() {
        let dbg = format!("{:?}", HighlightConfig::default());
        assert!(dbg.contains("max_turns"));
        assert!(dbg.contains("transport: None"));
    }
}
