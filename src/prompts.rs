//! Prompts and tool descriptions sent to the agent.
//!
//! Callers can override the instruction prompt via
//! [`crate::config::HighlightConfig::prompt`] and the system prompt via
//! [`crate::config::HighlightConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

use crate::pipeline::coords::AssumedCanvas;

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a meticulous document reviewer. You read PDF documents and point out the passages that matter by calling the highlight_pdf tool. You never invent content that is not on the page."#;

/// Default review instruction, used when `HighlightConfig::prompt` is `None`.
pub const DEFAULT_HIGHLIGHT_PROMPT: &str = r#"Review the attached PDF document.

1. FIND
   - Identify gaps, inconsistencies, missing information and risky statements
   - Prefer a few precise highlights over many vague ones

2. HIGHLIGHT
   - Call highlight_pdf once per passage
   - Cover the passage tightly; do not highlight whole pages
   - Give a short reason (under 80 characters) for each highlight

3. FINISH
   - When you have nothing left to highlight, reply with a concise summary
     of your findings in plain text and do not call any more tools"#;

/// Description attached to the `highlight_pdf` tool declaration.
pub const HIGHLIGHT_TOOL_DESCRIPTION: &str = "Mark a rectangular region on a given page of the PDF with a short rationale. \
Coordinates are in points with the origin at the top-left corner of the page.";

/// Content of the synthetic tool-result turn after an accepted highlight.
pub const TOOL_ACKNOWLEDGED: &str = "acknowledged";

/// Explain the coordinate system the agent must use.
///
/// The agent cannot measure the real pages, so every page is described as
/// having the canvas size.
pub fn canvas_instructions(canvas: AssumedCanvas) -> String {
    format!(
        "COORDINATES\n   \
         - Treat every page as {w} points wide and {h} points tall\n   \
         - (0, 0) is the top-left corner; x grows right, y grows down\n   \
         - xCoordinate/yCoordinate give the top-left corner of the region",
        w = fmt_points(canvas.width),
        h = fmt_points(canvas.height),
    )
}

/// Build the full instruction text of the opening turn.
pub fn compose_prompt(prompt: Option<&str>, canvas: AssumedCanvas) -> String {
    let base = prompt.unwrap_or(DEFAULT_HIGHLIGHT_PROMPT);
    format!("{}\n\n{}", base.trim_end(), canvas_instructions(canvas))
}

/// Tool-error text returned to the agent for a rejected call.
pub fn tool_error_message(detail: &str) -> String {
    format!("Highlight rejected: {detail}. Fix the arguments and call highlight_pdf again.")
}

fn fmt_points(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v:.2}")
    }
}
