use serde::{Deserialize, Serialize};

use crate::layout::DocumentType;

/// A struct that represents an error with a context and possibly the propagated source error.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContextError {
    pub context: String,
    pub source_error: Option<String>,
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_error {
            Some(source_error) => write!(
                formatter,
                "{}: {}",
                self.context,
                minimize_first_letter(source_error.to_string()),
            ),
            None => write!(formatter, "{}", self.context),
        }
    }
}

impl std::error::Error for ContextError {}

impl ContextError {
    /// Create a new `ContextError` with the given context.
    pub fn with_context<S: Into<String>>(context: S) -> ContextError {
        ContextError {
            context: context.into(),
            source_error: None,
        }
    }

    /// Create a new `ContextError` with the given context and source error.
    pub fn with_error<S: Into<String>>(context: S, error: &dyn std::error::Error) -> ContextError {
        ContextError {
            context: context.into(),
            source_error: Some(error.to_string()),
        }
    }
}

/// Minimizes the first letter of a string, it is used for standardizing the error message.
fn minimize_first_letter(string: String) -> String {
    let mut characters = string.chars();
    match characters.next() {
        None => String::new(),
        Some(character) => character.to_lowercase().chain(characters).collect(),
    }
}

/// The numeric fields of a project detail that go through normalization, and the
/// values computed from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumericField {
    Quantity,
    UnitPrice,
    /// Quantity times unit price.
    Amount,
    /// The running sum of the amounts, or the total once the tax is added.
    Subtotal,
}

impl std::fmt::Display for NumericField {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericField::Quantity => write!(formatter, "quantity"),
            NumericField::UnitPrice => write!(formatter, "unit price"),
            NumericField::Amount => write!(formatter, "amount"),
            NumericField::Subtotal => write!(formatter, "subtotal"),
        }
    }
}

/// Raised when a raw numeric value of a detail line cannot be turned into a decimal.
///
/// The `line` is the 1-based position of the detail in the project, so that the
/// end user can find the offending row exactly as it is listed on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NormalizationError {
    /// The value is missing, empty, not a number or not finite.
    InvalidNumeric {
        field: NumericField,
        line: usize,
        raw: Option<String>,
    },
    /// The value is a valid number, but billed and delivered amounts can't be negative.
    NegativeValue {
        field: NumericField,
        line: usize,
        raw: String,
    },
    /// The value computed up to this line no longer fits into a decimal.
    OutOfRange { field: NumericField, line: usize },
}

impl NormalizationError {
    pub fn field(&self) -> NumericField {
        match self {
            NormalizationError::InvalidNumeric { field, .. }
            | NormalizationError::NegativeValue { field, .. }
            | NormalizationError::OutOfRange { field, .. } => *field,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            NormalizationError::InvalidNumeric { line, .. }
            | NormalizationError::NegativeValue { line, .. }
            | NormalizationError::OutOfRange { line, .. } => *line,
        }
    }
}

impl std::fmt::Display for NormalizationError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizationError::InvalidNumeric {
                field,
                line,
                raw: Some(raw),
            } => write!(formatter, "Invalid {field} {raw:?} on line {line}"),
            NormalizationError::InvalidNumeric {
                field,
                line,
                raw: None,
            } => write!(formatter, "Missing {field} on line {line}"),
            NormalizationError::NegativeValue { field, line, raw } => {
                write!(formatter, "Negative {field} {raw:?} on line {line}")
            }
            NormalizationError::OutOfRange { field, line } => {
                write!(formatter, "The {field} exceeds the supported range on line {line}")
            }
        }
    }
}

impl std::error::Error for NormalizationError {}

/// Wraps the first normalization failure met while summing the lines of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationError {
    pub document_type: DocumentType,
    pub source: NormalizationError,
}

impl std::fmt::Display for AggregationError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "Unable to compute the totals of the {}: {}",
            self.document_type.label(),
            minimize_first_letter(self.source.to_string())
        )
    }
}

impl std::error::Error for AggregationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Raised when a document type is requested by a name which is not known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedDocumentType(pub String);

impl std::fmt::Display for UnsupportedDocumentType {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "Unsupported document type {:?}, expected one of \"invoice\", \"delivery-note\" or \"quotation\"",
            self.0
        )
    }
}

impl std::error::Error for UnsupportedDocumentType {}

/// The failures of the PDF rendering step.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// The project has neither detail lines nor notes.
    EmptyProject { project_id: i64 },
    /// The embedded font has no glyph for a character of the given field.
    UnsupportedGlyph { character: char, field: String },
    /// The totals, terms and notes don't fit on a page, even on a page of their own.
    FooterTooLong {
        line_count: usize,
        maximum_line_count: usize,
    },
    /// The PDF document could not be assembled or written out.
    IoFailure(ContextError),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::EmptyProject { project_id } => write!(
                formatter,
                "Project {project_id} has no detail lines and no notes to render"
            ),
            RenderError::UnsupportedGlyph { character, field } => write!(
                formatter,
                "The font has no glyph for {:?} (U+{:04X}) used in the {field}",
                character, *character as u32
            ),
            RenderError::FooterTooLong {
                line_count,
                maximum_line_count,
            } => write!(
                formatter,
                "The footer takes {line_count} lines but at most {maximum_line_count} fit on a page"
            ),
            RenderError::IoFailure(error) => write!(formatter, "{error}"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<ContextError> for RenderError {
    fn from(error: ContextError) -> Self {
        RenderError::IoFailure(error)
    }
}

/// Any failure of the generation pipeline, as reported to the caller of the generator.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationError {
    Aggregation(AggregationError),
    UnsupportedDocumentType(UnsupportedDocumentType),
    Render(RenderError),
}

impl GenerationError {
    /// The normalization failure behind this error, if the numeric input was at fault.
    pub fn normalization_error(&self) -> Option<&NormalizationError> {
        match self {
            GenerationError::Aggregation(error) => Some(&error.source),
            _ => None,
        }
    }
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Aggregation(error) => write!(formatter, "{error}"),
            GenerationError::UnsupportedDocumentType(error) => write!(formatter, "{error}"),
            GenerationError::Render(error) => write!(formatter, "{error}"),
        }
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GenerationError::Aggregation(error) => Some(error),
            GenerationError::UnsupportedDocumentType(error) => Some(error),
            GenerationError::Render(error) => Some(error),
        }
    }
}

impl From<AggregationError> for GenerationError {
    fn from(error: AggregationError) -> Self {
        GenerationError::Aggregation(error)
    }
}

impl From<UnsupportedDocumentType> for GenerationError {
    fn from(error: UnsupportedDocumentType) -> Self {
        GenerationError::UnsupportedDocumentType(error)
    }
}

impl From<RenderError> for GenerationError {
    fn from(error: RenderError) -> Self {
        GenerationError::Render(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_error_lowercases_the_propagated_source() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "No such file");
        let error = ContextError::with_error("Failed to read the configuration file", &io_error);

        assert_eq!(
            error.to_string(),
            "Failed to read the configuration file: no such file"
        );
    }

    #[test]
    fn aggregation_error_names_the_line_and_the_field() {
        let error = AggregationError {
            document_type: DocumentType::Invoice,
            source: NormalizationError::InvalidNumeric {
                field: NumericField::Quantity,
                line: 3,
                raw: None,
            },
        };

        assert_eq!(
            error.to_string(),
            "Unable to compute the totals of the invoice: missing quantity on line 3"
        );
    }
}
