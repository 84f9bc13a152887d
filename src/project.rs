use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// A read-only snapshot of a repair or service job, as handed over by the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub customer: Customer,
    #[serde(default)]
    pub machine_model: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub details: Vec<ProjectDetail>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Issue date of the document in the `YYYY-MM-DD` format.
    #[serde(default)]
    pub issue_date: Option<String>,
    /// Number printed on the document, derived from the project ID when absent.
    #[serde(default)]
    pub document_number: Option<String>,
}

impl Project {
    pub fn from_path(project_path: &Path) -> Result<Project, ContextError> {
        let project_content = std::fs::read_to_string(project_path).map_err(|error| {
            ContextError::with_error(format!("Unable to read the project {:?}", project_path), &error)
        })?;
        let project: Project = serde_json::from_str(&project_content).map_err(|error| {
            ContextError::with_error(format!("Unable to parse the project {:?}", project_path), &error)
        })?;

        Ok(project)
    }

    /// Whether the project carries notes with at least one visible character.
    pub fn has_notes(&self) -> bool {
        self.notes
            .as_deref()
            .is_some_and(|notes| !notes.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    #[serde(default)]
    pub honorific: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact_person: Option<String>,
}

impl Customer {
    /// The customer name followed by its honorific, which defaults to the one used for companies.
    pub fn addressed_name(&self) -> String {
        let honorific = self.honorific.as_deref().unwrap_or("御中");
        if honorific.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, honorific)
        }
    }
}

/// One billable or delivered line of a project.
///
/// The quantity and the unit price are kept exactly as they came from the client: a JSON
/// number, a numeric string, `null` or missing altogether. They only become decimals
/// by going through `normalize`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: Option<RawNumeric>,
    #[serde(default)]
    pub unit_price: Option<RawNumeric>,
    #[serde(default, rename = "type")]
    pub line_type: Option<LineType>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub travel_type: Option<String>,
    #[serde(default)]
    pub outsourcing_detail_type: Option<String>,
    #[serde(default)]
    pub labor_type: Option<String>,
}

impl ProjectDetail {
    /// The sub-classification that matters for the line type of this detail.
    pub fn sub_classification(&self) -> Option<&str> {
        let sub_classification = match self.line_type? {
            LineType::Labor => self.labor_type.as_deref(),
            LineType::Travel => self.travel_type.as_deref(),
            LineType::Outsourcing => self.outsourcing_detail_type.as_deref(),
            LineType::Part => None,
        };
        sub_classification.filter(|value| !value.trim().is_empty())
    }
}

/// A numeric value as it arrives from the outside world, before any validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawNumeric {
    Number(f64),
    Text(String),
}

impl From<f64> for RawNumeric {
    fn from(value: f64) -> Self {
        RawNumeric::Number(value)
    }
}

impl From<i64> for RawNumeric {
    fn from(value: i64) -> Self {
        RawNumeric::Number(value as f64)
    }
}

impl From<&str> for RawNumeric {
    fn from(value: &str) -> Self {
        RawNumeric::Text(value.to_string())
    }
}

impl std::fmt::Display for RawNumeric {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawNumeric::Number(number) => write!(formatter, "{number}"),
            RawNumeric::Text(text) => write!(formatter, "{text}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum LineType {
    Labor,
    Part,
    Travel,
    Outsourcing,
}

impl LineType {
    /// The label printed in the category column of the documents.
    pub fn label(&self) -> &'static str {
        match self {
            LineType::Labor => "作業",
            LineType::Part => "部品",
            LineType::Travel => "出張",
            LineType::Outsourcing => "外注",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_numerics_keep_their_json_shape() {
        let detail: ProjectDetail = serde_json::from_str(
            r#"{"description": "Pump overhaul", "quantity": "1,500", "unitPrice": 2.5, "type": "labor", "laborType": "overhaul"}"#,
        )
        .unwrap();

        assert_eq!(detail.quantity, Some(RawNumeric::Text("1,500".into())));
        assert_eq!(detail.unit_price, Some(RawNumeric::Number(2.5)));
        assert_eq!(detail.line_type, Some(LineType::Labor));
        assert_eq!(detail.sub_classification(), Some("overhaul"));
    }

    #[test]
    fn null_and_missing_numerics_are_both_absent() {
        let detail: ProjectDetail =
            serde_json::from_str(r#"{"description": "Filter", "quantity": null}"#).unwrap();

        assert_eq!(detail.quantity, None);
        assert_eq!(detail.unit_price, None);
    }

    #[test]
    fn customers_are_addressed_with_an_honorific() {
        let mut customer = Customer {
            name: "山田製作所".into(),
            ..Default::default()
        };
        assert_eq!(customer.addressed_name(), "山田製作所 御中");

        customer.honorific = Some("様".into());
        assert_eq!(customer.addressed_name(), "山田製作所 様");

        customer.honorific = Some(String::new());
        assert_eq!(customer.addressed_name(), "山田製作所");
    }
}
