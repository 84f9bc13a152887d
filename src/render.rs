use std::sync::Arc;

use rust_decimal::Decimal;
use time::{Date, Duration, OffsetDateTime};
use unicode_normalization::UnicodeNormalization as _;

use crate::aggregate::{Aggregate, RenderedLine};
use crate::configuration::{GeneratorConfiguration, Issuer};
use crate::error::RenderError;
use crate::layout::{Alignment, Column, DocumentType, FooterPolicy, LayoutSpec};
use crate::pdf::{millimeters_to_points, points_to_millimeters, Font, PdfDocument, WriteTextError};
use crate::project::{Customer, Project};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const MARGIN: f32 = 15.0;
const LINE_HEIGHT: f32 = 5.0;
const TITLE_FONT_SIZE: f32 = 18.0;
const NAME_FONT_SIZE: f32 = 12.0;
const HEADLINE_FONT_SIZE: f32 = 11.0;
/// Distance from the top of the page to the top of the table, on the first and on the other pages.
const FIRST_PAGE_TABLE_OFFSET: f32 = 100.0;
const CONTINUATION_TABLE_OFFSET: f32 = 32.0;
const BOTTOM_MARGIN: f32 = 18.0;
const MAXIMUM_ROW_HEIGHT: f32 = 7.0;
const MINIMUM_ROW_HEIGHT: f32 = 2.5;
const CELL_PADDING: f32 = 1.5;
/// Gap between the totals and the terms of the footer.
const FOOTER_SPACING: f32 = 2.0;
const ELLIPSIS: char = '…';
const TOTALS_WIDTH: f32 = 70.0;
const BREAKDOWN_WIDTH: f32 = 60.0;

const BLACK: [f32; 3] = [0.0, 0.0, 0.0];
const GRAY: [f32; 3] = [0.45, 0.45, 0.45];
const HEADER_FILL: [f32; 3] = [0.88, 0.9, 0.93];

/// A finished document, ready to be streamed to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    /// File name to be suggested through the `Content-Disposition` header.
    pub file_name: String,
    pub page_count: usize,
}

/// A label and its value, such as `小計` and `¥2,500`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub label: String,
    pub value: String,
}

impl Field {
    fn new<L: Into<String>, V: Into<String>>(label: L, value: V) -> Self {
        Field {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// What is printed below the table on the last page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FooterPlan {
    pub totals: Vec<Field>,
    /// Subtotals per line type.
    pub breakdown: Vec<Field>,
    /// Payment terms, signature line or validity period, depending on the document type.
    pub terms: Vec<String>,
    pub notes: Vec<String>,
}

impl FooterPlan {
    /// The number of text lines the footer takes up.
    fn line_count(&self) -> usize {
        let notes_line_count = match self.notes.len() {
            0 => 0,
            length => length + 1,
        };
        self.totals.len().max(self.breakdown.len()) + self.terms.len() + notes_line_count
    }

    /// The height taken below the table, from the bottom of the table to the lowest baseline.
    fn height(&self) -> f32 {
        self.line_count() as f32 * LINE_HEIGHT + FOOTER_SPACING
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    /// The heading of the continuation pages, the first page has the full header block instead.
    pub heading: Option<String>,
    /// The cells of every row, one per column of the layout.
    pub rows: Vec<Vec<String>>,
    /// Only the last page has a footer.
    pub footer: Option<FooterPlan>,
    /// The page number out of the page count, such as `2 / 5`.
    pub marker: String,
}

impl PagePlan {
    /// A continuation page without any row only carries the footer, without an empty table.
    pub fn has_table(&self) -> bool {
        !self.rows.is_empty() || self.heading.is_none()
    }
}

/// The vertical layout shared by every page of a document.
#[derive(Debug, Clone, Copy)]
struct PageGeometry {
    page_height: f32,
    row_height: f32,
    /// Whether the rows were shrunk so that the footer fits below a full page of rows.
    reserves_footer: bool,
}

impl PageGeometry {
    fn new(configuration: &GeneratorConfiguration, footer: &FooterPlan) -> Self {
        let row_slots = (configuration.page_row_capacity + 1) as f32;
        let table_height = configuration.page_height - FIRST_PAGE_TABLE_OFFSET - BOTTOM_MARGIN;
        let row_height = (table_height - footer.height()) / row_slots;
        if row_height >= MINIMUM_ROW_HEIGHT {
            return PageGeometry {
                page_height: configuration.page_height,
                row_height: row_height.min(MAXIMUM_ROW_HEIGHT),
                reserves_footer: true,
            };
        }

        PageGeometry {
            page_height: configuration.page_height,
            row_height: (table_height / row_slots).min(MAXIMUM_ROW_HEIGHT),
            reserves_footer: false,
        }
    }

    fn table_top(&self, first_page: bool) -> f32 {
        if first_page {
            self.page_height - FIRST_PAGE_TABLE_OFFSET
        } else {
            self.page_height - CONTINUATION_TABLE_OFFSET
        }
    }

    /// The bottom of the table holding the header row and the given number of rows.
    fn table_bottom(&self, first_page: bool, row_count: usize) -> f32 {
        self.table_top(first_page) - (row_count + 1) as f32 * self.row_height
    }

    /// Whether the footer fits below a table of the given number of rows.
    fn fits_footer(&self, first_page: bool, row_count: usize, footer: &FooterPlan) -> bool {
        self.reserves_footer
            || self.table_bottom(first_page, row_count) - footer.height() >= BOTTOM_MARGIN
    }

    /// The most footer lines a continuation page without any table can hold.
    fn maximum_footer_line_count(&self) -> usize {
        let available_height = self.table_top(false) - BOTTOM_MARGIN - FOOTER_SPACING;
        (available_height / LINE_HEIGHT).floor().max(0.0) as usize
    }
}

/// Every piece of text of a document, already split into pages.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPlan {
    pub document_type: DocumentType,
    pub title: String,
    pub document_number: String,
    /// The issue date, as printed.
    pub issue_date: Option<String>,
    /// The issue date, when it is a valid `YYYY-MM-DD` date.
    pub issue_date_value: Option<Date>,
    pub recipient: Vec<String>,
    pub issuer: Vec<String>,
    /// Machine model, serial number and the other metadata of the document type.
    pub metadata: Vec<Field>,
    /// The amount due or the delivery statement, printed right above the table.
    pub headline: String,
    pub columns: Vec<Column>,
    pub column_headers: Vec<String>,
    /// The height of every table row, in millimeters.
    pub row_height: f32,
    pub pages: Vec<PagePlan>,
}

/// Lays out the text of the document and splits the table rows into pages of at most
/// `page_row_capacity` rows, the footer going on the last page only.
///
/// The rows are made short enough for the footer to fit below a full page of them. When that
/// would make them unreadable, the footer gets a page of its own after the last rows instead,
/// and a footer taller than a whole page is rejected.
pub fn plan_document(
    project: &Project,
    aggregate: &Aggregate,
    layout: &LayoutSpec,
    configuration: &GeneratorConfiguration,
) -> Result<DocumentPlan, RenderError> {
    if aggregate.lines.is_empty() && !project.has_notes() {
        return Err(RenderError::EmptyProject {
            project_id: project.id,
        });
    }

    let document_number = match project.document_number.as_deref().map(str::trim) {
        Some(document_number) if !document_number.is_empty() => document_number.to_string(),
        _ => format!("{}-{:06}", layout.number_prefix, project.id),
    };
    let raw_issue_date = project
        .issue_date
        .as_deref()
        .map(str::trim)
        .filter(|issue_date| !issue_date.is_empty());
    let issue_date_value = raw_issue_date.and_then(parse_iso_date);
    if let (Some(raw_issue_date), None) = (raw_issue_date, issue_date_value) {
        log::warn!(
            "The issue date {:?} of the project {} is not a YYYY-MM-DD date, printing it as it is",
            raw_issue_date,
            project.id
        );
    }
    let issue_date = match issue_date_value {
        Some(date) => Some(japanese_date(date)),
        None => raw_issue_date.map(str::to_string),
    };

    let money = |amount: Decimal| format_money(amount, configuration);

    let mut metadata = vec![
        Field::new("機種", non_empty_or_dash(project.machine_model.as_deref())),
        Field::new("製造番号", non_empty_or_dash(project.serial_number.as_deref())),
    ];
    let validity = match issue_date_value
        .and_then(|date| date.checked_add(Duration::days(configuration.quotation_validity_days.into())))
    {
        Some(valid_until) => japanese_date(valid_until),
        None => format!("発行日より{}日間", configuration.quotation_validity_days),
    };
    if layout.footer == FooterPolicy::ValidityPeriod {
        metadata.push(Field::new("有効期限", validity.clone()));
    }

    let headline = match layout.document_type {
        DocumentType::Invoice => format!("ご請求金額  {} (税込)", money(aggregate.total)),
        DocumentType::Quotation => format!("御見積金額  {} (税込)", money(aggregate.total)),
        DocumentType::DeliveryNote => "下記の通り納品いたします。".to_string(),
    };

    let mut footer = FooterPlan::default();
    if layout.shows_totals {
        footer.totals.push(Field::new("小計", money(aggregate.subtotal)));
        if layout.shows_tax {
            let tax_percentage = (configuration.tax_rate * Decimal::ONE_HUNDRED).normalize();
            footer.totals.push(Field::new(
                format!("消費税 ({tax_percentage}%)"),
                money(aggregate.tax),
            ));
        }
        footer.totals.push(Field::new("合計", money(aggregate.total)));
    }
    if layout.shows_breakdown && aggregate.category_subtotals.len() > 1 {
        footer.breakdown = aggregate
            .category_subtotals
            .iter()
            .map(|category_subtotal| {
                let label = category_subtotal
                    .line_type
                    .map(|line_type| line_type.label())
                    .unwrap_or("その他");
                Field::new(label, money(category_subtotal.amount))
            })
            .collect();
    }
    footer.terms = match layout.footer {
        FooterPolicy::PaymentTerms => text_lines(&configuration.payment_terms),
        FooterPolicy::SignatureLine => vec![
            "上記の通り受領いたしました。".to_string(),
            "受領日　　　年　　月　　日　　受領印".to_string(),
        ],
        FooterPolicy::ValidityPeriod => vec![format!("本見積書の有効期限: {validity}")],
    };
    footer.notes = project.notes.as_deref().map(text_lines).unwrap_or_default();

    let rows = aggregate
        .lines
        .iter()
        .map(|line| {
            layout
                .columns
                .iter()
                .map(|column| cell_text(line, *column, configuration))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    let mut row_chunks = rows
        .chunks(configuration.page_row_capacity.max(1))
        .map(<[Vec<String>]>::to_vec)
        .collect::<Vec<_>>();
    if row_chunks.is_empty() {
        row_chunks.push(Vec::new());
    }

    let geometry = PageGeometry::new(configuration, &footer);
    let last_row_count = row_chunks.last().map(Vec::len).unwrap_or_default();
    if !geometry.fits_footer(row_chunks.len() == 1, last_row_count, &footer) {
        let maximum_line_count = geometry.maximum_footer_line_count();
        if footer.line_count() > maximum_line_count {
            return Err(RenderError::FooterTooLong {
                line_count: footer.line_count(),
                maximum_line_count,
            });
        }
        log::debug!(
            "The footer of {} doesn't fit below the last rows, it goes on a page of its own",
            document_number
        );
        row_chunks.push(Vec::new());
    }

    let page_count = row_chunks.len();
    let pages = row_chunks
        .into_iter()
        .enumerate()
        .map(|(index, rows)| PagePlan {
            heading: (index > 0)
                .then(|| format!("{} {} (続き)", layout.title, document_number)),
            rows,
            footer: (index + 1 == page_count).then(|| footer.clone()),
            marker: format!("{} / {}", index + 1, page_count),
        })
        .collect::<Vec<_>>();
    log::debug!(
        "Planned the {} {} on {} pages",
        layout.document_type.label(),
        document_number,
        page_count
    );

    Ok(DocumentPlan {
        document_type: layout.document_type,
        title: layout.title.to_string(),
        document_number,
        issue_date,
        issue_date_value,
        recipient: recipient_lines(&project.customer),
        issuer: issuer_lines(configuration.issuer.as_ref()),
        metadata,
        headline,
        columns: layout.columns.clone(),
        column_headers: layout
            .columns
            .iter()
            .map(|column| column.header().to_string())
            .collect(),
        row_height: geometry.row_height,
        pages,
    })
}

/// Renders the project into a PDF document.
///
/// Every piece of text is checked against the font beforehand, so that a character which
/// can't be drawn is reported with the field it belongs to, instead of turning into a blank.
pub fn render(
    project: &Project,
    aggregate: &Aggregate,
    layout: &LayoutSpec,
    font: &Arc<Font>,
    configuration: &GeneratorConfiguration,
) -> Result<RenderedDocument, RenderError> {
    let plan = plan_document(project, aggregate, layout, configuration)?;
    check_glyph_coverage(&plan, font)?;
    let bytes = write_pdf(&plan, font, configuration)?;
    log::info!(
        "Rendered the {} {} ({} pages, {} bytes)",
        plan.document_type.label(),
        plan.document_number,
        plan.pages.len(),
        bytes.len()
    );

    Ok(RenderedDocument {
        bytes,
        content_type: PDF_CONTENT_TYPE,
        file_name: format!("{}.pdf", sanitize_file_stem(&plan.document_number)),
        page_count: plan.pages.len(),
    })
}

/// Makes sure the font has a glyph for every character of the plan.
pub fn check_glyph_coverage(plan: &DocumentPlan, font: &Font) -> Result<(), RenderError> {
    let check = |field: &dyn Fn() -> String, text: &str| match font.first_missing_character(text) {
        Some(character) => Err(RenderError::UnsupportedGlyph {
            character,
            field: field(),
        }),
        None => Ok(()),
    };

    check(&|| "title".to_string(), &plan.title)?;
    check(&|| "document number".to_string(), &plan.document_number)?;
    if let Some(issue_date) = &plan.issue_date {
        check(&|| "issue date".to_string(), issue_date)?;
    }
    for line in plan.recipient.iter() {
        check(&|| "customer".to_string(), line)?;
    }
    for line in plan.issuer.iter() {
        check(&|| "issuer".to_string(), line)?;
    }
    for field in plan.metadata.iter() {
        check(&|| field.label.clone(), &field.label)?;
        check(&|| field.label.clone(), &field.value)?;
    }
    check(&|| "headline".to_string(), &plan.headline)?;
    for header in plan.column_headers.iter() {
        check(&|| "table header".to_string(), header)?;
    }

    for page in plan.pages.iter() {
        if let Some(heading) = &page.heading {
            check(&|| "page heading".to_string(), heading)?;
        }
        check(&|| "page number".to_string(), &page.marker)?;
        for row in page.rows.iter() {
            let line_number = row.first().map(String::as_str).unwrap_or_default();
            for (column, cell) in plan.columns.iter().zip(row.iter()) {
                check(
                    &|| format!("{} of line {}", column.name(), line_number),
                    cell,
                )?;
            }
        }
        if let Some(footer) = &page.footer {
            for field in footer.totals.iter().chain(footer.breakdown.iter()) {
                check(&|| "totals".to_string(), &field.label)?;
                check(&|| "totals".to_string(), &field.value)?;
            }
            for line in footer.terms.iter() {
                check(&|| "terms".to_string(), line)?;
            }
            if !footer.notes.is_empty() {
                check(&|| "notes".to_string(), "備考")?;
            }
            for line in footer.notes.iter() {
                check(&|| "notes".to_string(), line)?;
            }
        }
    }

    Ok(())
}

impl From<WriteTextError> for RenderError {
    fn from(error: WriteTextError) -> Self {
        match error {
            WriteTextError::Character(character) => RenderError::UnsupportedGlyph {
                character,
                field: "document".into(),
            },
            WriteTextError::Document(error) => RenderError::IoFailure(error),
        }
    }
}

/// Draws onto a single page of the document with the one font of the document.
struct Canvas<'a> {
    document: &'a mut PdfDocument,
    font: &'a Font,
    font_index: usize,
    page_index: usize,
}

impl Canvas<'_> {
    fn text(
        &mut self,
        text: &str,
        font_size: f32,
        position: [f32; 2],
        color: [f32; 3],
    ) -> Result<(), RenderError> {
        if text.is_empty() {
            return Ok(());
        }
        self.document.write_text_to_page(
            self.page_index,
            color,
            text,
            self.font_index,
            font_size,
            position,
        )?;

        Ok(())
    }

    fn text_right(
        &mut self,
        text: &str,
        font_size: f32,
        right: f32,
        y: f32,
        color: [f32; 3],
    ) -> Result<(), RenderError> {
        let width = self.font.text_width(text, font_size);
        self.text(text, font_size, [right - width, y], color)
    }

    fn text_centered(
        &mut self,
        text: &str,
        font_size: f32,
        center: f32,
        y: f32,
    ) -> Result<(), RenderError> {
        let width = self.font.text_width(text, font_size);
        self.text(text, font_size, [center - width / 2.0, y], BLACK)
    }

    fn line(&mut self, from: [f32; 2], to: [f32; 2], line_width: f32) -> Result<(), RenderError> {
        self.document
            .draw_line(self.page_index, BLACK, line_width, from, to)?;
        Ok(())
    }

    fn fill(&mut self, origin: [f32; 2], size: [f32; 2], color: [f32; 3]) -> Result<(), RenderError> {
        self.document
            .fill_rectangle(self.page_index, color, origin, size)?;
        Ok(())
    }
}

/// Cuts the text at the last character which still fits into the given width (in millimeters).
///
/// A clipped text ends with an ellipsis when the font can draw one, so that a reader can tell
/// it apart from a text which is just short.
pub fn clip_to_width(font: &Font, text: &str, font_size: f32, maximum_width: f32) -> String {
    if font.text_width(text, font_size) <= maximum_width {
        return text.to_string();
    }
    let ellipsis = font.has_glyph(ELLIPSIS).then_some(ELLIPSIS);
    let ellipsis_width = ellipsis
        .map(|ellipsis| font.text_width(ellipsis.encode_utf8(&mut [0; 4]), font_size))
        .unwrap_or_default();

    let mut clipped = String::new();
    let mut width = ellipsis_width;
    for character in text.nfc() {
        let character_width = font.text_width(character.encode_utf8(&mut [0; 4]), font_size);
        if width + character_width > maximum_width {
            break;
        }
        width += character_width;
        clipped.push(character);
    }
    if let Some(ellipsis) = ellipsis.filter(|_| width <= maximum_width) {
        clipped.push(ellipsis);
    }
    log::debug!("Clipped {:?} to {:?} to fit into {:.1}mm", text, clipped, maximum_width);
    clipped
}

/// The geometry of the table, shared by every page so that all the rows line up.
struct TableGeometry {
    /// Left edge of every column and the right edge of the table as last element.
    edges: Vec<f32>,
    row_height: f32,
    font_size: f32,
}

impl TableGeometry {
    fn new(plan: &DocumentPlan, configuration: &GeneratorConfiguration) -> Self {
        let row_height = plan.row_height;
        let table_width = configuration.page_width - 2.0 * MARGIN;
        let total_weight: f32 = plan.columns.iter().map(Column::weight).sum();
        let mut edges = vec![MARGIN];
        for column in plan.columns.iter() {
            let left = edges.last().copied().unwrap_or(MARGIN);
            edges.push(left + table_width * column.weight() / total_weight);
        }
        let font_size = configuration
            .font_size
            .min(millimeters_to_points(row_height) * 0.75);

        TableGeometry {
            edges,
            row_height,
            font_size,
        }
    }

    /// The baseline of the text in the row whose top edge is at `top`.
    fn baseline(&self, top: f32) -> f32 {
        top - (self.row_height + points_to_millimeters(self.font_size) * 0.7) / 2.0
    }

    fn draw_row(
        &self,
        canvas: &mut Canvas<'_>,
        columns: &[Column],
        cells: &[String],
        top: f32,
    ) -> Result<(), RenderError> {
        let baseline = self.baseline(top);
        for (index, (column, cell)) in columns.iter().zip(cells.iter()).enumerate() {
            let left = self.edges[index] + CELL_PADDING;
            let right = self.edges[index + 1] - CELL_PADDING;
            let cell = clip_to_width(canvas.font, cell, self.font_size, right - left);
            match column.alignment() {
                Alignment::Left => canvas.text(&cell, self.font_size, [left, baseline], BLACK)?,
                Alignment::Right => {
                    canvas.text_right(&cell, self.font_size, right, baseline, BLACK)?
                }
            }
        }
        Ok(())
    }
}

fn write_pdf(
    plan: &DocumentPlan,
    font: &Arc<Font>,
    configuration: &GeneratorConfiguration,
) -> Result<Vec<u8>, RenderError> {
    let page_width = configuration.page_width;
    let page_height = configuration.page_height;
    let geometry = TableGeometry::new(plan, configuration);

    let mut pdf_document = PdfDocument::new(plan.document_number.clone());
    pdf_document.metadata.title = format!("{} {}", plan.title, plan.document_number);
    pdf_document.metadata.subject = plan.recipient.first().cloned().unwrap_or_default();
    if let Some(issuer_name) = plan.issuer.first() {
        pdf_document.metadata.author = issuer_name.clone();
    }
    if let Some(issue_date) = plan.issue_date_value {
        pdf_document.metadata.creation_date = issue_date.midnight().assume_utc();
    } else {
        pdf_document.metadata.creation_date = OffsetDateTime::UNIX_EPOCH;
    }
    let font_index = pdf_document.add_font(Arc::clone(font));

    for (index, page) in plan.pages.iter().enumerate() {
        let page_index = pdf_document.add_page(page_width, page_height);
        let mut canvas = Canvas {
            document: &mut pdf_document,
            font,
            font_index,
            page_index,
        };

        let table_top = match &page.heading {
            None => {
                draw_header_block(&mut canvas, plan, configuration)?;
                page_height - FIRST_PAGE_TABLE_OFFSET
            }
            Some(heading) => {
                canvas.text(
                    heading,
                    configuration.font_size + 2.0,
                    [MARGIN, page_height - 20.0],
                    BLACK,
                )?;
                page_height - CONTINUATION_TABLE_OFFSET
            }
        };

        let table_bottom = if page.has_table() {
            draw_table(&mut canvas, &geometry, plan, page, table_top, page_width)?
        } else {
            table_top
        };

        if let Some(footer) = &page.footer {
            draw_footer(&mut canvas, footer, table_bottom - LINE_HEIGHT, configuration)?;
        }

        canvas.text_centered(&page.marker, configuration.font_size, page_width / 2.0, 10.0)?;
        log::debug!(
            "Laid out page {} of {} with {} rows",
            index + 1,
            plan.pages.len(),
            page.rows.len()
        );
    }

    pdf_document.write_all(format!("{}-{}", plan.document_number, pdf_document.page_count()))?;
    Ok(pdf_document.save_to_bytes()?)
}

/// Draws the header row and the rows of the page, returning the bottom of the table.
fn draw_table(
    canvas: &mut Canvas<'_>,
    geometry: &TableGeometry,
    plan: &DocumentPlan,
    page: &PagePlan,
    table_top: f32,
    page_width: f32,
) -> Result<f32, RenderError> {
    // The header row is repeated on every page
    let table_left = MARGIN;
    let table_right = page_width - MARGIN;
    canvas.fill(
        [table_left, table_top - geometry.row_height],
        [table_right - table_left, geometry.row_height],
        HEADER_FILL,
    )?;
    geometry.draw_row(canvas, &plan.columns, &plan.column_headers, table_top)?;
    canvas.line([table_left, table_top], [table_right, table_top], 0.8)?;

    let mut row_top = table_top - geometry.row_height;
    canvas.line([table_left, row_top], [table_right, row_top], 0.5)?;
    for row in page.rows.iter() {
        geometry.draw_row(canvas, &plan.columns, row, row_top)?;
        row_top -= geometry.row_height;
        canvas.line([table_left, row_top], [table_right, row_top], 0.2)?;
    }
    canvas.line([table_left, row_top], [table_right, row_top], 0.8)?;

    Ok(row_top)
}

fn draw_header_block(
    canvas: &mut Canvas<'_>,
    plan: &DocumentPlan,
    configuration: &GeneratorConfiguration,
) -> Result<(), RenderError> {
    let page_width = configuration.page_width;
    let page_height = configuration.page_height;
    let font_size = configuration.font_size;
    let right = page_width - MARGIN;

    canvas.text_centered(&plan.title, TITLE_FONT_SIZE, page_width / 2.0, page_height - 22.0)?;
    canvas.text_right(
        &format!("No. {}", plan.document_number),
        font_size,
        right,
        page_height - 32.0,
        BLACK,
    )?;
    if let Some(issue_date) = &plan.issue_date {
        canvas.text_right(
            &format!("発行日 {issue_date}"),
            font_size,
            right,
            page_height - 37.0,
            BLACK,
        )?;
    }

    let mut y = page_height - 45.0;
    for (index, line) in plan.recipient.iter().enumerate() {
        if index == 0 {
            canvas.text(line, NAME_FONT_SIZE, [MARGIN, y], BLACK)?;
            canvas.line([MARGIN, y - 1.5], [page_width / 2.0 - 5.0, y - 1.5], 0.6)?;
            y -= LINE_HEIGHT + 2.0;
        } else {
            canvas.text(line, font_size, [MARGIN, y], BLACK)?;
            y -= LINE_HEIGHT;
        }
    }

    let issuer_left = page_width / 2.0 + 15.0;
    let mut issuer_y = page_height - 45.0;
    for line in plan.issuer.iter() {
        canvas.text(line, font_size, [issuer_left, issuer_y], BLACK)?;
        issuer_y -= LINE_HEIGHT;
    }

    let mut y = y.min(issuer_y) - 2.0;
    for field in plan.metadata.iter() {
        canvas.text(&field.label, font_size, [MARGIN, y], GRAY)?;
        canvas.text(&field.value, font_size, [MARGIN + 22.0, y], BLACK)?;
        y -= LINE_HEIGHT;
    }

    canvas.text(
        &plan.headline,
        HEADLINE_FONT_SIZE,
        [MARGIN, page_height - FIRST_PAGE_TABLE_OFFSET + 4.0],
        BLACK,
    )
}

fn draw_footer(
    canvas: &mut Canvas<'_>,
    footer: &FooterPlan,
    top: f32,
    configuration: &GeneratorConfiguration,
) -> Result<(), RenderError> {
    let font_size = configuration.font_size;
    let right = configuration.page_width - MARGIN;

    let mut breakdown_y = top;
    for field in footer.breakdown.iter() {
        canvas.text(&field.label, font_size, [MARGIN, breakdown_y], GRAY)?;
        canvas.text_right(&field.value, font_size, MARGIN + BREAKDOWN_WIDTH, breakdown_y, GRAY)?;
        breakdown_y -= LINE_HEIGHT;
    }

    let mut totals_y = top;
    let totals_left = right - TOTALS_WIDTH;
    for (index, field) in footer.totals.iter().enumerate() {
        if index + 1 == footer.totals.len() {
            canvas.line(
                [totals_left, totals_y + LINE_HEIGHT - 1.0],
                [right, totals_y + LINE_HEIGHT - 1.0],
                0.6,
            )?;
        }
        canvas.text(&field.label, font_size, [totals_left, totals_y], BLACK)?;
        canvas.text_right(&field.value, font_size, right, totals_y, BLACK)?;
        totals_y -= LINE_HEIGHT;
    }

    let mut y = breakdown_y.min(totals_y) - FOOTER_SPACING;
    for line in footer.terms.iter() {
        canvas.text(line, font_size, [MARGIN, y], BLACK)?;
        y -= LINE_HEIGHT;
    }
    if !footer.notes.is_empty() {
        canvas.text("備考", font_size, [MARGIN, y], GRAY)?;
        y -= LINE_HEIGHT;
        for line in footer.notes.iter() {
            canvas.text(line, font_size, [MARGIN + 4.0, y], BLACK)?;
            y -= LINE_HEIGHT;
        }
    }

    Ok(())
}

fn cell_text(line: &RenderedLine, column: Column, configuration: &GeneratorConfiguration) -> String {
    match column {
        Column::Number => line.number.to_string(),
        Column::Date => line.date.clone().unwrap_or_default(),
        Column::Category => line
            .line_type
            .map(|line_type| line_type.label().to_string())
            .unwrap_or_default(),
        Column::Description => line.description.clone(),
        Column::Quantity => format_quantity(line.quantity),
        Column::UnitPrice => format_money(line.unit_price, configuration),
        Column::Amount => format_money(line.amount, configuration),
    }
}

/// Formats an amount with the currency symbol, thousands separators and exactly the currency precision.
pub fn format_money(amount: Decimal, configuration: &GeneratorConfiguration) -> String {
    let mut amount = amount;
    amount.rescale(configuration.currency_precision);
    format!(
        "{}{}",
        configuration.currency_symbol,
        group_thousands(&amount.to_string())
    )
}

/// Formats a quantity without its trailing zeros, `2.00` becoming `2`.
pub fn format_quantity(quantity: Decimal) -> String {
    group_thousands(&quantity.normalize().to_string())
}

fn group_thousands(number: &str) -> String {
    let (integer_part, fractional_part) = match number.split_once('.') {
        Some((integer_part, fractional_part)) => (integer_part, Some(fractional_part)),
        None => (number, None),
    };
    let grouped = integer_part
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(",");
    match fractional_part {
        Some(fractional_part) => format!("{grouped}.{fractional_part}"),
        None => grouped,
    }
}

fn parse_iso_date(text: &str) -> Option<Date> {
    let format = time::format_description::parse("[year]-[month]-[day]").ok()?;
    Date::parse(text, &format).ok()
}

fn japanese_date(date: Date) -> String {
    format!(
        "{}年{}月{}日",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

fn non_empty_or_dash(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => "-".to_string(),
    }
}

/// Splits a free text into its non-blank lines.
fn text_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn recipient_lines(customer: &Customer) -> Vec<String> {
    let mut lines = vec![customer.addressed_name()];
    let address = [customer.postal_code.as_deref().map(|postal_code| format!("〒{postal_code}")), customer.address.clone()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    if !address.is_empty() {
        lines.push(address);
    }
    if let Some(phone) = &customer.phone {
        lines.push(format!("TEL {phone}"));
    }
    if let Some(contact_person) = &customer.contact_person {
        lines.push(format!("ご担当: {contact_person} 様"));
    }
    lines
}

fn issuer_lines(issuer: Option<&Issuer>) -> Vec<String> {
    let Some(issuer) = issuer else {
        return Vec::new();
    };
    let mut lines = vec![issuer.name.clone()];
    if let Some(postal_code) = &issuer.postal_code {
        lines.push(format!("〒{postal_code}"));
    }
    if let Some(address) = &issuer.address {
        lines.push(address.clone());
    }
    if let Some(phone) = &issuer.phone {
        lines.push(format!("TEL {phone}"));
    }
    if let Some(registration_number) = &issuer.registration_number {
        lines.push(format!("登録番号 {registration_number}"));
    }
    lines
}

fn sanitize_file_stem(document_number: &str) -> String {
    document_number
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '-' || character == '_' {
                character
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::layout::select_layout;
    use crate::project::ProjectDetail;

    fn sample_project(line_count: usize) -> Project {
        Project {
            id: 42,
            customer: Customer {
                name: "山田製作所".into(),
                postal_code: Some("100-0001".into()),
                address: Some("東京都千代田区1-1".into()),
                ..Default::default()
            },
            machine_model: Some("PC200-8".into()),
            serial_number: None,
            details: (0..line_count)
                .map(|index| ProjectDetail {
                    description: format!("Part {index}"),
                    quantity: Some(1_i64.into()),
                    unit_price: Some(100_i64.into()),
                    ..Default::default()
                })
                .collect(),
            notes: None,
            issue_date: Some("2024-05-01".into()),
            document_number: None,
        }
    }

    fn plan_for(
        project: &Project,
        document_type: DocumentType,
        configuration: &GeneratorConfiguration,
    ) -> Result<DocumentPlan, RenderError> {
        let aggregate = aggregate(&project.details, document_type, configuration).unwrap();
        plan_document(project, &aggregate, &select_layout(document_type), configuration)
    }

    fn configuration() -> GeneratorConfiguration {
        GeneratorConfiguration::with_font_file_path("font.ttf")
    }

    #[test]
    fn the_footer_is_only_on_the_last_page() {
        let mut configuration = configuration();
        configuration.page_row_capacity = 40;

        let plan = plan_for(&sample_project(200), DocumentType::Invoice, &configuration).unwrap();

        assert_eq!(plan.pages.len(), 5);
        assert!(plan.pages.iter().all(|page| page.rows.len() == 40));
        assert!(plan.pages[..4].iter().all(|page| page.footer.is_none()));
        let footer = plan.pages[4].footer.as_ref().unwrap();
        assert_eq!(
            footer.totals.last(),
            Some(&Field::new("合計", "¥22,000"))
        );
        assert_eq!(plan.pages[0].heading, None);
        assert_eq!(
            plan.pages[1].heading.as_deref(),
            Some("請求書 INV-000042 (続き)")
        );
        assert_eq!(plan.pages[2].marker, "3 / 5");
    }

    #[test]
    fn a_page_that_is_just_full_does_not_spill_over() {
        let plan = plan_for(&sample_project(40), DocumentType::Invoice, &configuration()).unwrap();
        assert_eq!(plan.pages.len(), 1);

        let plan = plan_for(&sample_project(41), DocumentType::Invoice, &configuration()).unwrap();
        assert_eq!(plan.pages.len(), 2);
        assert_eq!(plan.pages[1].rows.len(), 1);
    }

    #[test]
    fn a_project_with_only_notes_has_a_single_page() {
        let mut project = sample_project(0);
        project.notes = Some("Machine inspected\n\nNo defects found".into());

        let plan = plan_for(&project, DocumentType::Invoice, &configuration()).unwrap();

        assert_eq!(plan.pages.len(), 1);
        assert!(plan.pages[0].rows.is_empty());
        assert_eq!(
            plan.pages[0].footer.as_ref().unwrap().notes,
            vec!["Machine inspected", "No defects found"]
        );
    }

    fn notes(line_count: usize) -> String {
        (1..=line_count)
            .map(|index| format!("Remark {index}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn a_footer_too_long_for_the_last_rows_gets_a_page_of_its_own() {
        let mut project = sample_project(40);
        project.notes = Some(notes(40));

        let plan = plan_for(&project, DocumentType::Invoice, &configuration()).unwrap();

        assert_eq!(plan.pages.len(), 2);
        assert_eq!(plan.pages[0].rows.len(), 40);
        assert!(plan.pages[0].footer.is_none());
        assert!(plan.pages[1].rows.is_empty());
        assert!(!plan.pages[1].has_table());
        assert_eq!(plan.pages[1].footer.as_ref().unwrap().notes.len(), 40);
        assert_eq!(plan.pages[1].marker, "2 / 2");
        assert!(plan.row_height >= MINIMUM_ROW_HEIGHT);
    }

    #[test]
    fn a_short_footer_shares_the_page_of_the_last_rows() {
        let mut project = sample_project(10);
        project.notes = Some(notes(20));

        let plan = plan_for(&project, DocumentType::Invoice, &configuration()).unwrap();

        assert_eq!(plan.pages.len(), 1);
        assert!(plan.pages[0].has_table());

        let mut project = sample_project(40);
        project.notes = Some(notes(3));
        let plan = plan_for(&project, DocumentType::Invoice, &configuration()).unwrap();
        assert_eq!(plan.pages.len(), 1);
    }

    #[test]
    fn a_footer_taller_than_a_page_is_rejected() {
        let mut project = sample_project(1);
        project.notes = Some(notes(100));

        assert_eq!(
            plan_for(&project, DocumentType::Invoice, &configuration()),
            Err(RenderError::FooterTooLong {
                line_count: 105,
                maximum_line_count: 49,
            })
        );
    }

    #[test]
    fn an_empty_project_is_rejected() {
        let mut project = sample_project(0);
        project.notes = Some("  \n ".into());

        assert_eq!(
            plan_for(&project, DocumentType::Quotation, &configuration()),
            Err(RenderError::EmptyProject { project_id: 42 })
        );
    }

    #[test]
    fn delivery_notes_print_no_price() {
        let mut project = sample_project(2);
        project.details[0].quantity = Some(2_i64.into());
        project.details[0].unit_price = Some(1000_i64.into());
        project.details[1].unit_price = Some(500_i64.into());

        let plan = plan_for(&project, DocumentType::DeliveryNote, &configuration()).unwrap();

        assert_eq!(plan.title, "納品書");
        assert_eq!(plan.document_number, "DN-000042");
        assert_eq!(plan.column_headers, vec!["No.", "日付", "区分", "品名・作業内容", "数量"]);
        assert_eq!(plan.pages[0].rows[0], vec!["1", "", "", "Part 0", "2"]);
        assert_eq!(plan.pages[0].rows[1], vec!["2", "", "", "Part 1", "1"]);
        assert!(plan
            .pages
            .iter()
            .flat_map(|page| page.rows.iter().flatten())
            .all(|cell| !cell.contains('¥')));
        let footer = plan.pages[0].footer.as_ref().unwrap();
        assert!(footer.totals.is_empty());
        assert!(footer.breakdown.is_empty());
        assert_eq!(footer.terms.len(), 2);
        assert!(!plan.headline.contains('¥'));
    }

    #[test]
    fn quotations_are_valid_for_the_configured_days() {
        let plan = plan_for(&sample_project(1), DocumentType::Quotation, &configuration()).unwrap();

        assert_eq!(plan.issue_date.as_deref(), Some("2024年5月1日"));
        assert_eq!(
            plan.metadata.last(),
            Some(&Field::new("有効期限", "2024年5月31日"))
        );

        let mut project = sample_project(1);
        project.issue_date = None;
        let plan = plan_for(&project, DocumentType::Quotation, &configuration()).unwrap();
        assert_eq!(
            plan.metadata.last(),
            Some(&Field::new("有効期限", "発行日より30日間"))
        );
    }

    #[test]
    fn explicit_document_numbers_are_kept() {
        let mut project = sample_project(1);
        project.document_number = Some("2024-0815".into());

        let plan = plan_for(&project, DocumentType::Invoice, &configuration()).unwrap();

        assert_eq!(plan.document_number, "2024-0815");
        assert_eq!(plan.metadata[0], Field::new("機種", "PC200-8"));
        assert_eq!(plan.metadata[1], Field::new("製造番号", "-"));
        assert_eq!(plan.recipient[0], "山田製作所 御中");
        assert_eq!(plan.recipient[1], "〒100-0001 東京都千代田区1-1");
    }

    #[test]
    fn amounts_are_grouped_by_thousands() {
        let mut configuration = configuration();
        assert_eq!(format_money(Decimal::new(1_234_567, 0), &configuration), "¥1,234,567");
        assert_eq!(format_money(Decimal::ZERO, &configuration), "¥0");

        configuration.currency_precision = 2;
        configuration.currency_symbol = "$".into();
        assert_eq!(format_money(Decimal::new(125, 1), &configuration), "$12.50");

        assert_eq!(format_quantity(Decimal::new(200, 2)), "2");
        assert_eq!(format_quantity(Decimal::new(150, 2)), "1.5");
        assert_eq!(format_quantity(Decimal::new(1500, 0)), "1,500");
    }
}
