use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// The settings of the document generator, read once when the process starts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfiguration {
    /// Consumption tax rate applied to the subtotal, `0.10` for 10%.
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,
    /// Number of fractional digits of the currency, zero for the yen.
    #[serde(default)]
    pub currency_precision: u32,
    /// Number of fractional digits kept for quantities, such as labor hours.
    #[serde(default = "default_quantity_precision")]
    pub quantity_precision: u32,
    /// Maximum number of table rows on a single page.
    #[serde(default = "default_page_row_capacity")]
    pub page_row_capacity: usize,
    /// TTF/OTF font covering every script used in the documents.
    pub font_file_path: PathBuf,
    /// Page width in millimeters.
    #[serde(default = "default_page_width")]
    pub page_width: f32,
    /// Page height in millimeters.
    #[serde(default = "default_page_height")]
    pub page_height: f32,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    #[serde(default)]
    pub issuer: Option<Issuer>,
    #[serde(default = "default_payment_terms")]
    pub payment_terms: String,
    #[serde(default = "default_quotation_validity_days")]
    pub quotation_validity_days: u32,
}

/// The business issuing the documents, printed in the top right corner.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Issuer {
    pub name: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Qualified invoice issuer registration number (`T` followed by 13 digits).
    #[serde(default)]
    pub registration_number: Option<String>,
}

fn default_tax_rate() -> Decimal {
    Decimal::new(10, 2)
}

fn default_quantity_precision() -> u32 {
    2
}

fn default_page_row_capacity() -> usize {
    40
}

fn default_page_width() -> f32 {
    210.0
}

fn default_page_height() -> f32 {
    297.0
}

fn default_font_size() -> f32 {
    9.0
}

fn default_currency_symbol() -> String {
    "¥".into()
}

fn default_payment_terms() -> String {
    "お支払いは請求日より30日以内にお願いいたします。".into()
}

fn default_quotation_validity_days() -> u32 {
    30
}

impl GeneratorConfiguration {
    /// A configuration with the default values for everything but the font.
    pub fn with_font_file_path<P: Into<PathBuf>>(font_file_path: P) -> Self {
        GeneratorConfiguration {
            tax_rate: default_tax_rate(),
            currency_precision: 0,
            quantity_precision: default_quantity_precision(),
            page_row_capacity: default_page_row_capacity(),
            font_file_path: font_file_path.into(),
            page_width: default_page_width(),
            page_height: default_page_height(),
            font_size: default_font_size(),
            currency_symbol: default_currency_symbol(),
            issuer: None,
            payment_terms: default_payment_terms(),
            quotation_validity_days: default_quotation_validity_days(),
        }
    }

    pub fn from_path(configuration_file_path: &Path) -> Result<Self, ContextError> {
        let configuration_file_contents = std::fs::read_to_string(configuration_file_path)
            .map_err(|error| {
                ContextError::with_error("Failed to read the configuration file", &error)
            })?;
        let configuration: GeneratorConfiguration =
            serde_json::from_str(&configuration_file_contents).map_err(|error| {
                ContextError::with_error("Failed to parse the configuration file", &error)
            })?;
        configuration.validate()?;

        Ok(configuration)
    }

    /// Checks the values which would otherwise produce meaningless documents.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.tax_rate < Decimal::ZERO {
            return Err(ContextError::with_context(format!(
                "The tax rate can't be negative, found {}",
                self.tax_rate
            )));
        }
        // Beyond this scale the decimal type can no longer represent the amounts exactly
        if self.currency_precision > 10 || self.quantity_precision > 10 {
            return Err(ContextError::with_context(format!(
                "The currency and quantity precisions must be at most 10, found {} and {}",
                self.currency_precision, self.quantity_precision
            )));
        }
        if self.page_row_capacity == 0 {
            return Err(ContextError::with_context(
                "The page row capacity must be at least 1",
            ));
        }
        if !(self.page_width > 0.0 && self.page_height > 0.0 && self.font_size > 0.0) {
            return Err(ContextError::with_context(format!(
                "The page size and the font size must be positive, found {}x{} and {}",
                self.page_width, self.page_height, self.font_size
            )));
        }
        // The header block and the table header take up the top 100mm of the first page
        if self.page_width < 100.0 || self.page_height < 140.0 {
            return Err(ContextError::with_context(format!(
                "The page must be at least 100x140mm, found {}x{}",
                self.page_width, self.page_height
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_fall_back_to_the_defaults() {
        let configuration: GeneratorConfiguration =
            serde_json::from_str(r#"{"fontFilePath": "fonts/NotoSansJP-Regular.ttf"}"#).unwrap();

        similar_asserts::assert_eq!(
            configuration,
            GeneratorConfiguration::with_font_file_path("fonts/NotoSansJP-Regular.ttf")
        );
        assert!(configuration.validate().is_ok());
    }

    #[test]
    fn tax_rates_are_read_from_numbers_and_strings() {
        let from_number: GeneratorConfiguration =
            serde_json::from_str(r#"{"fontFilePath": "font.ttf", "taxRate": 0.08}"#).unwrap();
        let from_string: GeneratorConfiguration =
            serde_json::from_str(r#"{"fontFilePath": "font.ttf", "taxRate": "0.08"}"#).unwrap();

        assert_eq!(from_number.tax_rate, Decimal::new(8, 2));
        assert_eq!(from_string.tax_rate, Decimal::new(8, 2));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut configuration = GeneratorConfiguration::with_font_file_path("font.ttf");
        configuration.page_row_capacity = 0;
        assert!(configuration.validate().is_err());

        let mut configuration = GeneratorConfiguration::with_font_file_path("font.ttf");
        configuration.tax_rate = Decimal::new(-1, 1);
        assert!(configuration.validate().is_err());
    }

    #[test]
    fn pages_too_small_for_the_header_block_are_rejected() {
        let mut configuration = GeneratorConfiguration::with_font_file_path("font.ttf");
        configuration.page_height = 120.0;
        assert!(configuration.validate().is_err());

        // A5 still fits
        configuration.page_width = 148.0;
        configuration.page_height = 210.0;
        assert!(configuration.validate().is_ok());
    }
}
