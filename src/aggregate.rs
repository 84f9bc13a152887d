use rust_decimal::Decimal;

use crate::configuration::GeneratorConfiguration;
use crate::error::{AggregationError, NormalizationError, NumericField};
use crate::layout::DocumentType;
use crate::normalize::{normalize, round_half_up};
use crate::project::{LineType, ProjectDetail};

/// A validated detail line, ready to be laid out in the table of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLine {
    /// 1-based position of the line in the project.
    pub number: usize,
    pub date: Option<String>,
    pub line_type: Option<LineType>,
    /// The description, followed by the sub-classification of the line type if there is one.
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// `quantity * unit_price` rounded to the currency precision.
    pub amount: Decimal,
}

/// The total of the lines sharing the same line type.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySubtotal {
    pub line_type: Option<LineType>,
    pub amount: Decimal,
}

/// The lines of a project together with the totals of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub document_type: DocumentType,
    pub lines: Vec<RenderedLine>,
    /// One entry per line type, in the order in which the line types first appear.
    pub category_subtotals: Vec<CategorySubtotal>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Validates the details of a project and computes the line amounts and the document totals.
///
/// The first detail with an invalid quantity or unit price aborts the whole aggregation,
/// no partial totals are ever returned. So does an amount or a running total which no longer
/// fits into a decimal. Lines keep the order of the details.
pub fn aggregate(
    details: &[ProjectDetail],
    document_type: DocumentType,
    configuration: &GeneratorConfiguration,
) -> Result<Aggregate, AggregationError> {
    let currency_precision = configuration.currency_precision;
    let mut lines = Vec::with_capacity(details.len());
    let mut exact_subtotal = Decimal::ZERO;
    let mut exact_category_subtotals = Vec::<(Option<LineType>, Decimal)>::new();

    let wrap = |source| AggregationError {
        document_type,
        source,
    };
    let out_of_range = |field, line| wrap(NormalizationError::OutOfRange { field, line });

    for (index, detail) in details.iter().enumerate() {
        let number = index + 1;
        let quantity = normalize(
            detail.quantity.as_ref(),
            NumericField::Quantity,
            number,
            configuration.quantity_precision,
        )
        .map_err(wrap)?;
        let unit_price = normalize(
            detail.unit_price.as_ref(),
            NumericField::UnitPrice,
            number,
            currency_precision,
        )
        .map_err(wrap)?;

        // Amounts are summed before rounding so that the rounding of the lines doesn't drift the subtotal
        let exact_amount = quantity
            .checked_mul(unit_price)
            .ok_or_else(|| out_of_range(NumericField::Amount, number))?;
        exact_subtotal = exact_subtotal
            .checked_add(exact_amount)
            .ok_or_else(|| out_of_range(NumericField::Subtotal, number))?;
        // Never larger than the subtotal, which was just checked
        match exact_category_subtotals
            .iter_mut()
            .find(|(line_type, _)| *line_type == detail.line_type)
        {
            Some((_, category_subtotal)) => *category_subtotal += exact_amount,
            None => exact_category_subtotals.push((detail.line_type, exact_amount)),
        }

        let description = match detail.sub_classification() {
            Some(sub_classification) => {
                format!("{} ({})", detail.description.trim(), sub_classification.trim())
            }
            None => detail.description.trim().to_string(),
        };
        lines.push(RenderedLine {
            number,
            date: detail.date.clone().filter(|date| !date.trim().is_empty()),
            line_type: detail.line_type,
            description,
            quantity,
            unit_price,
            amount: round_half_up(exact_amount, currency_precision),
        });
    }

    let subtotal = round_half_up(exact_subtotal, currency_precision);
    let (tax, total) = subtotal
        .checked_mul(configuration.tax_rate)
        .map(|tax| round_half_up(tax, currency_precision))
        .and_then(|tax| Some((tax, subtotal.checked_add(tax)?)))
        .ok_or_else(|| out_of_range(NumericField::Subtotal, details.len()))?;
    log::debug!(
        "Aggregated {} lines of the {}: subtotal {}, tax {}, total {}",
        lines.len(),
        document_type.label(),
        subtotal,
        tax,
        total
    );

    Ok(Aggregate {
        document_type,
        lines,
        category_subtotals: exact_category_subtotals
            .into_iter()
            .map(|(line_type, amount)| CategorySubtotal {
                line_type,
                amount: round_half_up(amount, currency_precision),
            })
            .collect(),
        subtotal,
        tax,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NormalizationError;
    use crate::project::RawNumeric;

    fn detail(quantity: Option<RawNumeric>, unit_price: Option<RawNumeric>) -> ProjectDetail {
        ProjectDetail {
            description: "Hydraulic hose".into(),
            quantity,
            unit_price,
            ..Default::default()
        }
    }

    fn configuration() -> GeneratorConfiguration {
        GeneratorConfiguration::with_font_file_path("font.ttf")
    }

    #[test]
    fn totals_of_a_simple_invoice() {
        let details = vec![
            detail(Some(2_i64.into()), Some(1000_i64.into())),
            detail(Some(1_i64.into()), Some("500".into())),
        ];

        let aggregate = aggregate(&details, DocumentType::Invoice, &configuration()).unwrap();

        assert_eq!(aggregate.subtotal, Decimal::new(2500, 0));
        assert_eq!(aggregate.tax, Decimal::new(250, 0));
        assert_eq!(aggregate.total, Decimal::new(2750, 0));
        assert_eq!(
            aggregate
                .lines
                .iter()
                .map(|line| line.amount)
                .collect::<Vec<_>>(),
            vec![Decimal::new(2000, 0), Decimal::new(500, 0)]
        );
    }

    #[test]
    fn the_first_invalid_line_aborts_the_aggregation() {
        let mut details = (0..5)
            .map(|_| detail(Some(1_i64.into()), Some(100_i64.into())))
            .collect::<Vec<_>>();
        details[2].quantity = None;
        details[3].unit_price = Some("-5".into());

        let error = aggregate(&details, DocumentType::Quotation, &configuration()).unwrap_err();

        assert_eq!(error.document_type, DocumentType::Quotation);
        assert_eq!(
            error.source,
            NormalizationError::InvalidNumeric {
                field: NumericField::Quantity,
                line: 3,
                raw: None,
            }
        );
    }

    #[test]
    fn amounts_beyond_the_decimal_range_are_rejected() {
        let details = vec![
            detail(Some(1_i64.into()), Some(100_i64.into())),
            detail(Some("1000000000000000".into()), Some("1000000000000000".into())),
        ];

        let error = aggregate(&details, DocumentType::Invoice, &configuration()).unwrap_err();

        assert_eq!(
            error.source,
            NormalizationError::OutOfRange {
                field: NumericField::Amount,
                line: 2,
            }
        );
        assert_eq!(
            error.to_string(),
            "Unable to compute the totals of the invoice: the amount exceeds the supported range on line 2"
        );
    }

    #[test]
    fn a_subtotal_beyond_the_decimal_range_is_rejected() {
        let huge_quantity = "50000000000000000000000000000";
        let details = vec![
            detail(Some(huge_quantity.into()), Some(1_i64.into())),
            detail(Some(huge_quantity.into()), Some(1_i64.into())),
        ];

        let error = aggregate(&details, DocumentType::Quotation, &configuration()).unwrap_err();

        assert_eq!(
            error.source,
            NormalizationError::OutOfRange {
                field: NumericField::Subtotal,
                line: 2,
            }
        );
    }

    #[test]
    fn the_total_beyond_the_decimal_range_is_rejected() {
        let details = vec![detail(Some("75000000000000000000000000000".into()), Some(1_i64.into()))];

        let error = aggregate(&details, DocumentType::Invoice, &configuration()).unwrap_err();

        assert_eq!(error.source.field(), NumericField::Subtotal);
        assert_eq!(error.source.line(), 1);
    }

    #[test]
    fn the_subtotal_is_rounded_once() {
        // Each line is worth 0.5 yen: rounding every line would give 3, the exact sum is 1.5
        let details = (0..3)
            .map(|_| detail(Some("0.5".into()), Some(1_i64.into())))
            .collect::<Vec<_>>();

        let aggregate = aggregate(&details, DocumentType::Invoice, &configuration()).unwrap();

        assert!(aggregate
            .lines
            .iter()
            .all(|line| line.amount == Decimal::ONE));
        assert_eq!(aggregate.subtotal, Decimal::new(2, 0));
    }

    #[test]
    fn tax_is_rounded_half_up() {
        let details = vec![detail(Some(1_i64.into()), Some(105_i64.into()))];

        let aggregate = aggregate(&details, DocumentType::Invoice, &configuration()).unwrap();

        assert_eq!(aggregate.tax, Decimal::new(11, 0));
        assert_eq!(aggregate.total, Decimal::new(116, 0));
    }

    #[test]
    fn category_subtotals_follow_the_first_appearance() {
        let mut details = vec![
            detail(Some(1_i64.into()), Some(300_i64.into())),
            detail(Some(2_i64.into()), Some(100_i64.into())),
            detail(Some(1_i64.into()), Some(50_i64.into())),
        ];
        details[0].line_type = Some(LineType::Part);
        details[1].line_type = Some(LineType::Labor);
        details[1].labor_type = Some("inspection".into());
        details[2].line_type = Some(LineType::Part);

        let aggregate = aggregate(&details, DocumentType::Invoice, &configuration()).unwrap();

        assert_eq!(
            aggregate.category_subtotals,
            vec![
                CategorySubtotal {
                    line_type: Some(LineType::Part),
                    amount: Decimal::new(350, 0),
                },
                CategorySubtotal {
                    line_type: Some(LineType::Labor),
                    amount: Decimal::new(200, 0),
                },
            ]
        );
        assert_eq!(aggregate.lines[1].description, "Hydraulic hose (inspection)");
    }

    #[test]
    fn an_empty_project_has_zero_totals() {
        let aggregate = aggregate(&[], DocumentType::DeliveryNote, &configuration()).unwrap();

        assert!(aggregate.lines.is_empty());
        assert_eq!(aggregate.total, Decimal::ZERO);
    }
}
