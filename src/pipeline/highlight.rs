//! The `highlight_pdf` tool: argument validation and the accumulator.
//!
//! The agent proposes a [`HighlightRequest`] by calling the tool. Arguments
//! arrive as an untyped JSON object, so validation is done field by field
//! to report the exact problem back to the agent. Accepted requests become
//! [`HighlightRecord`]s, appended to the [`HighlightAccumulator`] in the
//! order they were accepted. That order is the render order.

use crate::error::ToolCallError;
use crate::pipeline::conversation::ToolSchema;
use crate::pipeline::coords::CanvasRegion;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Name under which the highlight capability is declared to the agent.
pub const HIGHLIGHT_TOOL_NAME: &str = "highlight_pdf";

const NUMERIC_FIELDS: [&str; 5] = ["xCoordinate", "yCoordinate", "width", "height", "pageNumber"];

/// Declared schema for the `highlight_pdf` tool. All six fields are required.
pub fn highlight_tool_schema() -> ToolSchema {
    ToolSchema {
        name: HIGHLIGHT_TOOL_NAME.to_string(),
        description: crate::prompts::HIGHLIGHT_TOOL_DESCRIPTION.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "xCoordinate": {
                    "type": "number",
                    "description": "Left edge of the region, in points from the left of the page"
                },
                "yCoordinate": {
                    "type": "number",
                    "description": "Top edge of the region, in points from the top of the page"
                },
                "width": {
                    "type": "number",
                    "description": "Width of the region in points"
                },
                "height": {
                    "type": "number",
                    "description": "Height of the region in points"
                },
                "pageNumber": {
                    "type": "number",
                    "description": "1-based page number"
                },
                "reason": {
                    "type": "string",
                    "description": "Short rationale shown next to the highlight"
                }
            },
            "required": ["xCoordinate", "yCoordinate", "width", "height", "pageNumber", "reason"]
        }),
    }
}

/// Arguments of one `highlight_pdf` call, as the agent sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRequest {
    pub x_coordinate: f64,
    pub y_coordinate: f64,
    pub width: f64,
    pub height: f64,
    pub page_number: f64,
    pub reason: String,
}

impl HighlightRequest {
    /// Parse the raw tool arguments without range checks.
    pub fn from_arguments(arguments: &Value) -> Result<Self, ToolCallError> {
        let obj = arguments
            .as_object()
            .ok_or(ToolCallError::ArgumentsNotObject)?;

        let mut numbers = [0.0f64; 5];
        for (slot, field) in numbers.iter_mut().zip(NUMERIC_FIELDS) {
            *slot = number_field(obj, field)?;
        }

        let reason = match obj.get("reason") {
            None | Some(Value::Null) => {
                return Err(ToolCallError::MissingField {
                    field: "reason".to_string(),
                })
            }
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(ToolCallError::NotAString {
                    field: "reason".to_string(),
                })
            }
        };

        let [x_coordinate, y_coordinate, width, height, page_number] = numbers;
        Ok(Self {
            x_coordinate,
            y_coordinate,
            width,
            height,
            page_number,
            reason,
        })
    }

    /// Validate against the document and turn into a record.
    ///
    /// `page_count` is `None` when the page count is unknown; the page is
    /// then checked only for being a positive integer.
    pub fn validate(self, page_count: Option<usize>) -> Result<HighlightRecord, ToolCallError> {
        let page = self.page_number;
        if page.fract() != 0.0 || page < 1.0 || page > u32::MAX as f64 {
            return Err(ToolCallError::InvalidPageNumber { value: page });
        }
        let page_number = page as usize;
        if let Some(total) = page_count {
            if page_number > total {
                return Err(ToolCallError::PageOutOfRange {
                    page: page_number,
                    total,
                });
            }
        }

        for (field, value) in [("width", self.width), ("height", self.height)] {
            if value < 0.0 {
                return Err(ToolCallError::NegativeExtent {
                    field: field.to_string(),
                    value,
                });
            }
        }

        let reason = self.reason.trim();
        if reason.is_empty() {
            return Err(ToolCallError::EmptyReason);
        }

        Ok(HighlightRecord {
            page_number,
            region: CanvasRegion {
                x: self.x_coordinate,
                y: self.y_coordinate,
                width: self.width,
                height: self.height,
            },
            reason: reason.to_string(),
        })
    }
}

fn number_field(obj: &Map<String, Value>, field: &str) -> Result<f64, ToolCallError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(ToolCallError::MissingField {
            field: field.to_string(),
        }),
        Some(Value::Number(n)) => {
            let v = n.as_f64().ok_or_else(|| ToolCallError::NotFinite {
                field: field.to_string(),
            })?;
            if v.is_finite() {
                Ok(v)
            } else {
                Err(ToolCallError::NotFinite {
                    field: field.to_string(),
                })
            }
        }
        Some(_) => Err(ToolCallError::NotANumber {
            field: field.to_string(),
        }),
    }
}

/// A validated, page-resolved highlight ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightRecord {
    /// 1-based page number.
    pub page_number: usize,
    /// Region in assumed-canvas units, origin top-left.
    pub region: CanvasRegion,
    /// Rationale text, trimmed and non-empty.
    pub reason: String,
}

/// Ordered, append-only collection of accepted highlights.
#[derive(Debug, Clone, Default)]
pub struct HighlightAccumulator {
    records: Vec<HighlightRecord>,
    page_count: Option<usize>,
}

impl HighlightAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator that rejects pages beyond `page_count`.
    pub fn for_document(page_count: usize) -> Self {
        Self {
            records: Vec::new(),
            page_count: Some(page_count),
        }
    }

    /// Validate raw tool arguments and append on success.
    ///
    /// Returns the 0-based position of the new record.
    pub fn accept(&mut self, arguments: &Value) -> Result<usize, ToolCallError> {
        let record = HighlightRequest::from_arguments(arguments)?.validate(self.page_count)?;
        self.records.push(record);
        Ok(self.records.len() - 1)
    }

    pub fn get(&self, index: usize) -> Option<&HighlightRecord> {
        self.records.get(index)
    }

    pub fn records(&self) -> &[HighlightRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<HighlightRecord> {
        self.records
    }
}
