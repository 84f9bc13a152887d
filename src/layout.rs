use serde::{Deserialize, Serialize};

use crate::error::UnsupportedDocumentType;

/// The kinds of documents that can be generated for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentType {
    Invoice,
    DeliveryNote,
    Quotation,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [
        DocumentType::Invoice,
        DocumentType::DeliveryNote,
        DocumentType::Quotation,
    ];

    /// The name used on the command line and in file names.
    pub fn name(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::DeliveryNote => "delivery-note",
            DocumentType::Quotation => "quotation",
        }
    }

    /// A human readable name, used in log and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::DeliveryNote => "delivery note",
            DocumentType::Quotation => "quotation",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.name())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = UnsupportedDocumentType;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let normalized_name = name.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized_name.as_str() {
            "invoice" => Ok(DocumentType::Invoice),
            "delivery-note" | "deliverynote" => Ok(DocumentType::DeliveryNote),
            "quotation" | "quote" => Ok(DocumentType::Quotation),
            _ => Err(UnsupportedDocumentType(name.to_string())),
        }
    }
}

/// The columns a line-item table can be made of, in the order in which they are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Column {
    Number,
    Date,
    Category,
    Description,
    Quantity,
    UnitPrice,
    Amount,
}

/// Horizontal alignment of the text inside a table cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    Left,
    Right,
}

impl Column {
    /// The name of the column in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Column::Number => "line number",
            Column::Date => "date",
            Column::Category => "category",
            Column::Description => "description",
            Column::Quantity => "quantity",
            Column::UnitPrice => "unit price",
            Column::Amount => "amount",
        }
    }

    pub fn header(&self) -> &'static str {
        match self {
            Column::Number => "No.",
            Column::Date => "日付",
            Column::Category => "区分",
            Column::Description => "品名・作業内容",
            Column::Quantity => "数量",
            Column::UnitPrice => "単価",
            Column::Amount => "金額",
        }
    }

    /// The relative width of the column, the description column takes whatever is left.
    pub fn weight(&self) -> f32 {
        match self {
            Column::Number => 1.0,
            Column::Date => 2.2,
            Column::Category => 1.4,
            Column::Description => 7.0,
            Column::Quantity => 1.6,
            Column::UnitPrice => 2.2,
            Column::Amount => 2.6,
        }
    }

    pub fn alignment(&self) -> Alignment {
        match self {
            Column::Number | Column::Quantity | Column::UnitPrice | Column::Amount => {
                Alignment::Right
            }
            Column::Date | Column::Category | Column::Description => Alignment::Left,
        }
    }

    pub fn is_monetary(&self) -> bool {
        matches!(self, Column::UnitPrice | Column::Amount)
    }
}

/// What is printed below the table on the last page of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FooterPolicy {
    /// Invoices carry the payment terms.
    PaymentTerms,
    /// Delivery notes carry a line for the signature of the recipient.
    SignatureLine,
    /// Quotations carry the date until which the quoted prices hold.
    ValidityPeriod,
}

/// The presentation of a document type: title, visible columns, totals and footer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSpec {
    pub document_type: DocumentType,
    pub title: &'static str,
    /// Prefix of the document number derived from the project ID.
    pub number_prefix: &'static str,
    pub columns: Vec<Column>,
    pub shows_totals: bool,
    pub shows_tax: bool,
    /// Whether the per-category subtotals are listed above the totals.
    pub shows_breakdown: bool,
    pub footer: FooterPolicy,
}

/// Selects the layout of the given document type.
pub fn select_layout(document_type: DocumentType) -> LayoutSpec {
    let priced_columns = vec![
        Column::Number,
        Column::Date,
        Column::Category,
        Column::Description,
        Column::Quantity,
        Column::UnitPrice,
        Column::Amount,
    ];

    match document_type {
        DocumentType::Invoice => LayoutSpec {
            document_type,
            title: "請求書",
            number_prefix: "INV",
            columns: priced_columns,
            shows_totals: true,
            shows_tax: true,
            shows_breakdown: true,
            footer: FooterPolicy::PaymentTerms,
        },
        DocumentType::DeliveryNote => LayoutSpec {
            document_type,
            title: "納品書",
            number_prefix: "DN",
            columns: vec![
                Column::Number,
                Column::Date,
                Column::Category,
                Column::Description,
                Column::Quantity,
            ],
            shows_totals: false,
            shows_tax: false,
            shows_breakdown: false,
            footer: FooterPolicy::SignatureLine,
        },
        DocumentType::Quotation => LayoutSpec {
            document_type,
            title: "御見積書",
            number_prefix: "QT",
            columns: priced_columns,
            shows_totals: true,
            shows_tax: true,
            shows_breakdown: true,
            footer: FooterPolicy::ValidityPeriod,
        },
    }
}

/// Selects the layout of a document type given by its name, such as `"delivery-note"`.
pub fn select_layout_by_name(name: &str) -> Result<LayoutSpec, UnsupportedDocumentType> {
    Ok(select_layout(name.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_notes_hide_every_price() {
        let layout = select_layout(DocumentType::DeliveryNote);

        assert!(!layout.columns.iter().any(Column::is_monetary));
        assert!(layout.columns.contains(&Column::Description));
        assert!(layout.columns.contains(&Column::Quantity));
        assert!(!layout.shows_totals);
        assert!(!layout.shows_tax);
        assert_eq!(layout.footer, FooterPolicy::SignatureLine);
    }

    #[test]
    fn invoices_and_quotations_differ_by_their_footer() {
        let invoice = select_layout(DocumentType::Invoice);
        let quotation = select_layout(DocumentType::Quotation);

        assert_eq!(invoice.columns, quotation.columns);
        assert_eq!(invoice.footer, FooterPolicy::PaymentTerms);
        assert_eq!(quotation.footer, FooterPolicy::ValidityPeriod);
        assert_ne!(invoice.title, quotation.title);
    }

    #[test]
    fn document_types_are_parsed_leniently() {
        assert_eq!("Invoice".parse(), Ok(DocumentType::Invoice));
        assert_eq!("delivery_note".parse(), Ok(DocumentType::DeliveryNote));
        assert_eq!(" quote ".parse(), Ok(DocumentType::Quotation));
        for document_type in DocumentType::ALL {
            assert_eq!(document_type.name().parse(), Ok(document_type));
        }
    }

    #[test]
    fn unknown_document_types_are_reported() {
        assert_eq!(
            select_layout_by_name("receipt"),
            Err(UnsupportedDocumentType("receipt".into()))
        );
    }
}
