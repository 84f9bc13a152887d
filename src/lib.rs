//! Jobdocs generates the business documents of a repair or service job: the invoice, the delivery note
//! and the quotation. A project snapshot, coming from the persistence layer as JSON, is validated, its
//! totals are computed with decimal arithmetic and the result is laid out and written as a PDF document.
//!
//! The entry point is the `DocumentGenerator` struct, which is built once from a `GeneratorConfiguration`
//! and then shared between any number of threads. Every stage of the pipeline is also exposed on its own,
//! so that the totals of a project can be computed, or its pages planned, without rendering anything.

/// The module where the `Project` snapshot and its detail lines are presented.
///
/// The quantities and unit prices of the detail lines are kept in their raw form, a JSON number or
/// a string, until they are normalized by the aggregation.
pub mod project;

/// This module contains the error types of the library.
///
/// The `ContextError` type is returned wherever a file is read or a PDF object is assembled, it carries an explanation
/// and, if the error happened in a function called by this library, the message of the propagated error.
/// The generation pipeline reports its failures with dedicated types instead, so that a caller can tell an
/// invalid detail line (`AggregationError`) apart from an unknown document type or a rendering failure.
pub mod error;

/// The conversion of raw numeric input into non-negative decimals rounded half-up.
pub mod normalize;

/// The computation of the line amounts, the per-category subtotals and the document totals.
///
/// Amounts are summed exactly and rounded once, so that the subtotal never drifts from
/// the sum of the unrounded line amounts.
pub mod aggregate;

/// The layout of each document type: its title, visible columns, totals and footer.
pub mod layout;

/// The configuration of the generator, read from a JSON file in camel case.
pub mod configuration;

/// The module where the `PdfDocument` interface for working with PDF documents is presented.
///
/// # Introduction
///
/// The main component of this module is the struct `PdfDocument`. It offers convenience functions
/// such as `add_page`, `add_font`, `write_text_to_page`, `draw_line`, `write_all` and `save_to_bytes`
/// which allow to interact with a PDF document in a meaningful way, while keeping all the complexity
/// hidden below a curtain of private methods.
///
/// Fonts are embedded as composite fonts (`Type0` with a `CIDFontType2` descendant) addressed by glyph ID,
/// together with a `ToUnicode` map so that the text can be searched and copied from a viewer. Nothing in
/// the produced documents depends on the time or on randomness: the same input gives the same bytes.
pub mod pdf;

/// The planning of the pages of a document and their rendering into PDF bytes.
///
/// Planning (`plan_document`) is a pure function from the project and its totals to the text of every page,
/// rendering (`render`) draws that plan with the embedded font.
pub mod render;

/// The `DocumentGenerator` which ties the pipeline together.
pub mod generator;

pub use aggregate::{aggregate, Aggregate, CategorySubtotal, RenderedLine};
pub use configuration::{GeneratorConfiguration, Issuer};
pub use error::{
    AggregationError, ContextError, GenerationError, NormalizationError, NumericField, RenderError,
    UnsupportedDocumentType,
};
pub use generator::DocumentGenerator;
pub use layout::{select_layout, select_layout_by_name, DocumentType, LayoutSpec};
pub use normalize::normalize;
pub use pdf::Font;
pub use project::{Customer, LineType, Project, ProjectDetail, RawNumeric};
pub use render::{plan_document, render, DocumentPlan, RenderedDocument};
