use std::str::FromStr as _;

use rust_decimal::prelude::FromPrimitive as _;
use rust_decimal::{Decimal, RoundingStrategy};
use unicode_normalization::UnicodeNormalization as _;

use crate::error::{NormalizationError, NumericField};
use crate::project::RawNumeric;

/// Turns a raw numeric value of the detail `line` (1-based) into a non-negative decimal
/// rounded half-up to `scale` fractional digits.
///
/// This is the only place where numeric input coming from the outside world is interpreted.
/// Missing, empty, non-numeric and non-finite values are rejected, they are never replaced by zero.
pub fn normalize(
    raw: Option<&RawNumeric>,
    field: NumericField,
    line: usize,
    scale: u32,
) -> Result<Decimal, NormalizationError> {
    let invalid = |raw: Option<String>| NormalizationError::InvalidNumeric { field, line, raw };

    let value = match raw {
        None => return Err(invalid(None)),
        Some(RawNumeric::Number(number)) => {
            if !number.is_finite() {
                return Err(invalid(Some(number.to_string())));
            }
            Decimal::from_f64(*number).ok_or_else(|| invalid(Some(number.to_string())))?
        }
        Some(RawNumeric::Text(text)) => {
            parse_numeric_text(text).ok_or_else(|| invalid(Some(text.clone())))?
        }
    };

    if value < Decimal::ZERO {
        return Err(NormalizationError::NegativeValue {
            field,
            line,
            raw: raw.map(|raw| raw.to_string()).unwrap_or_default(),
        });
    }

    Ok(round_half_up(value.abs(), scale))
}

/// Rounds half away from zero, which is half-up for the non-negative amounts of the documents.
pub fn round_half_up(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Parses a numeric string as typed by a person: surrounding and inner whitespace, thousands
/// separators, full-width characters and a leading yen sign are all accepted.
fn parse_numeric_text(text: &str) -> Option<Decimal> {
    // NFKC folds the full-width digits, commas and yen sign onto their ASCII counterparts
    let folded = text.nfkc().collect::<String>();
    let trimmed = folded.trim();
    let unsigned = trimmed.strip_prefix('¥').unwrap_or(trimmed);
    let compact = unsigned
        .chars()
        .filter(|character| *character != ',' && !character.is_whitespace())
        .collect::<String>();
    if compact.is_empty() {
        return None;
    }

    Decimal::from_str(&compact)
        .or_else(|_| Decimal::from_scientific(&compact))
        .ok()
}
