//! Bulk import of metric responses from CSV exports.
//!
//! ```text
//! institution_id,session,metric_code,type,selected,numerator,denominator,amount,base,items
//! college-1,2024-25,7.1.2,option_count,3,,,,,
//! college-1,2023-24,2.1.1,ratio,,58,60,,,
//! college-1,2024-25,7.1.10,checklist,,,,,,code_published;ethics_programs
//! ```
//!
//! Checklist rows list the items that are ticked; every other catalog item is false.
//! A row that cannot be read is set aside with its line; the rest still import.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::domain::{MetricPayload, ResponseSubmission};

/// Failures that stop an import outright. Per-row problems land in [`ResponseImport::rejected`].
#[derive(Debug)]
pub enum ResponseImportError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for ResponseImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseImportError::Io(err) => write!(f, "failed to read responses file: {}", err),
            ResponseImportError::Csv(err) => write!(f, "invalid responses CSV data: {}", err),
        }
    }
}

impl std::error::Error for ResponseImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResponseImportError::Io(err) => Some(err),
            ResponseImportError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ResponseImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ResponseImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// A parsed submission with the CSV line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedSubmission {
    pub line: usize,
    pub submission: ResponseSubmission,
}

/// Parsed rows of one export alongside the lines that could not be read.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResponseImport {
    pub rows: Vec<ImportedSubmission>,
    pub rejected: Vec<(usize, String)>,
}

impl From<Vec<ImportedSubmission>> for ResponseImport {
    fn from(rows: Vec<ImportedSubmission>) -> Self {
        Self {
            rows,
            rejected: Vec::new(),
        }
    }
}

pub fn from_path<P: AsRef<Path>>(path: P) -> Result<ResponseImport, ResponseImportError> {
    let file = std::fs::File::open(path)?;
    from_reader(file)
}

pub fn from_reader<R: Read>(reader: R) -> Result<ResponseImport, ResponseImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut import = ResponseImport::default();

    for (index, record) in csv_reader.deserialize::<ResponseRow>().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let parsed = match record {
            Ok(row) => row.into_submission(),
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => Err(err.to_string()),
        };

        match parsed {
            Ok(submission) => import.rows.push(ImportedSubmission { line, submission }),
            Err(message) => {
                tracing::warn!(line, error = %message, "unreadable response row skipped");
                import.rejected.push((line, message));
            }
        }
    }

    Ok(import)
}

#[derive(Debug, Deserialize)]
struct ResponseRow {
    institution_id: String,
    session: String,
    metric_code: String,
    #[serde(rename = "type")]
    payload_type: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    selected: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    numerator: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    denominator: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    amount: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    base: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    items: Option<String>,
}

impl ResponseRow {
    fn into_submission(self) -> Result<ResponseSubmission, String> {
        let payload = match self.payload_type.to_ascii_lowercase().as_str() {
            "option_count" | "options" => {
                let raw = required(&self.selected, "selected")?;
                let selected = raw
                    .parse::<u32>()
                    .map_err(|_| format!("selected '{raw}' is not a whole number"))?;
                MetricPayload::OptionCount { selected }
            }
            "ratio" => MetricPayload::Ratio {
                numerator: number(&self.numerator, "numerator")?,
                denominator: number(&self.denominator, "denominator")?,
            },
            "figures" => MetricPayload::Figures {
                amount: number(&self.amount, "amount")?,
                base: number(&self.base, "base")?,
            },
            "checklist" => {
                let items: BTreeMap<String, bool> = self
                    .items
                    .as_deref()
                    .unwrap_or_default()
                    .split(';')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| (item.to_string(), true))
                    .collect();
                MetricPayload::Checklist { items }
            }
            other => return Err(format!("unknown payload type '{other}'")),
        };

        Ok(ResponseSubmission {
            institution_id: self.institution_id,
            session: self.session,
            metric_code: self.metric_code,
            payload,
        })
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, String> {
    value
        .as_deref()
        .ok_or_else(|| format!("missing value for {field}"))
}

fn number(value: &Option<String>, field: &str) -> Result<f64, String> {
    let raw = required(value, field)?;
    raw.parse::<f64>()
        .map_err(|_| format!("{field} '{raw}' is not a number"))
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
