//! CSV loader for institution-supplied catalogs.
//!
//! One row per node. The depth of `code` decides what the row defines: `2` is a
//! criterion, `2.1` a sub-criterion, `2.1.1` a metric. Only metric rows read the
//! scoring columns.
//!
//! ```text
//! code,title,kind,weight,max_score,cap_tier,repeatable,checklist_items,point_thresholds
//! 7,Institutional Values,,0.1,,,,,
//! 7.1,Institutional Values and Social Responsibilities,,1,,,,,
//! 7.1.2,Alternate energy facilities,ENUM_OPTION_COUNT,1,,4,,,
//! 7.1.10,Code of conduct,BOOLEAN_CHECKLIST,1,,,,code_published;ethics_programs,
//! ```

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::{CatalogBuilder, CatalogError, GroupDefinition, MetricCatalog, MetricDefinition};
use crate::scoring::domain::{GroupKey, MetricCode, ScoringKind};

#[derive(Debug)]
pub enum CatalogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Row { line: usize, message: String },
    Catalog(CatalogError),
}

impl std::fmt::Display for CatalogImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogImportError::Io(err) => write!(f, "failed to read catalog file: {}", err),
            CatalogImportError::Csv(err) => write!(f, "invalid catalog CSV data: {}", err),
            CatalogImportError::Row { line, message } => {
                write!(f, "catalog row {}: {}", line, message)
            }
            CatalogImportError::Catalog(err) => write!(f, "inconsistent catalog: {}", err),
        }
    }
}

impl std::error::Error for CatalogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogImportError::Io(err) => Some(err),
            CatalogImportError::Csv(err) => Some(err),
            CatalogImportError::Row { .. } => None,
            CatalogImportError::Catalog(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CatalogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<CatalogError> for CatalogImportError {
    fn from(err: CatalogError) -> Self {
        Self::Catalog(err)
    }
}

pub fn from_path<P: AsRef<Path>>(path: P) -> Result<MetricCatalog, CatalogImportError> {
    let file = std::fs::File::open(path)?;
    from_reader(file)
}

pub fn from_reader<R: Read>(reader: R) -> Result<MetricCatalog, CatalogImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut builder = CatalogBuilder::default();

    for (index, record) in csv_reader.deserialize::<CatalogRow>().enumerate() {
        // Header is line 1.
        let line = index + 2;
        let row = record?;
        row.apply(line, &mut builder)?;
    }

    Ok(builder.build()?)
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    code: String,
    #[serde(default)]
    title: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    weight: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    max_score: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    cap_tier: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    repeatable: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    checklist_items: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    point_thresholds: Option<String>,
}

impl CatalogRow {
    fn apply(self, line: usize, builder: &mut CatalogBuilder) -> Result<(), CatalogImportError> {
        let row_error = |message: String| CatalogImportError::Row { line, message };
        let weight = parse_number(self.weight.as_deref(), "weight")
            .map_err(row_error)?
            .unwrap_or(1.0);

        if let Some(key) = GroupKey::parse(&self.code) {
            builder.push_group(GroupDefinition {
                key,
                title: self.title,
                weight,
            });
            return Ok(());
        }

        let code = MetricCode::parse(&self.code).map_err(|err| row_error(err.to_string()))?;
        let kind_raw = self
            .kind
            .as_deref()
            .ok_or_else(|| row_error(format!("metric {code} is missing a scoring kind")))?;
        let kind = ScoringKind::parse(kind_raw)
            .ok_or_else(|| row_error(format!("unknown scoring kind '{kind_raw}'")))?;

        let mut definition = MetricDefinition::new(code, self.title, kind).weight(weight);

        if let Some(max_score) =
            parse_number(self.max_score.as_deref(), "max_score").map_err(row_error)?
        {
            definition = definition.max_score(max_score);
        }
        if let Some(raw) = self.cap_tier.as_deref() {
            let cap = raw
                .parse::<u32>()
                .map_err(|_| row_error(format!("cap_tier '{raw}' is not a whole number")))?;
            definition = definition.cap_tier(cap);
        }
        if let Some(raw) = self.repeatable.as_deref() {
            definition = definition.repeatable(parse_flag(raw).map_err(row_error)?);
        }
        if let Some(raw) = self.checklist_items.as_deref() {
            definition = definition.checklist(
                raw.split(';')
                    .map(str::trim)
                    .filter(|item| !item.is_empty()),
            );
        }
        if let Some(raw) = self.point_thresholds.as_deref() {
            definition = definition.point_thresholds(parse_thresholds(raw).map_err(row_error)?);
        }

        builder.push_metric(definition);
        Ok(())
    }
}

fn parse_number(raw: Option<&str>, field: &str) -> Result<Option<f64>, String> {
    raw.map(|value| {
        value
            .parse::<f64>()
            .map_err(|_| format!("{field} '{value}' is not a number"))
    })
    .transpose()
}

fn parse_flag(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        other => Err(format!("repeatable '{other}' is not a yes/no value")),
    }
}

fn parse_thresholds(raw: &str) -> Result<[f64; 4], String> {
    let values = raw
        .split(';')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| format!("point threshold '{part}' is not a number"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    <[f64; 4]>::try_from(values.as_slice())
        .map_err(|_| format!("expected four point thresholds, found {}", values.len()))
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str =
        "code,title,kind,weight,max_score,cap_tier,repeatable,checklist_items,point_thresholds\n";

    #[test]
    fn imports_groups_and_metrics() {
        let csv = format!(
            "{HEADER}7,Institutional Values,,0.1,,,,,\n\
7.1,Social Responsibilities,,2,,,,,\n\
7.1.2,Alternate energy,ENUM_OPTION_COUNT,1,,4,,,\n\
7.1.10,Code of conduct,BOOLEAN_CHECKLIST,3,,,no,code_published; ethics_programs,100;75;50;25\n"
        );

        let catalog = from_reader(Cursor::new(csv)).expect("catalog imports");
        let sub = catalog
            .group(&GroupKey::sub_criterion(7, 1))
            .expect("sub-criterion present");
        assert_eq!(sub.weight, 2.0);

        let conduct = catalog
            .metric(&MetricCode::parse("7.1.10").unwrap())
            .expect("metric present");
        assert_eq!(conduct.weight, 3.0);
        assert_eq!(
            conduct.checklist_items,
            vec!["code_published".to_string(), "ethics_programs".to_string()]
        );
        assert!(!conduct.repeatable);
        assert_eq!(conduct.tier_cap(), 2);
    }

    #[test]
    fn reports_line_of_bad_rows() {
        let csv = format!("{HEADER}7,Institutional Values,,0.1,,,,,\n7.1.2,Energy,SOMETHING,,,,,,\n");
        match from_reader(Cursor::new(csv)) {
            Err(CatalogImportError::Row { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("SOMETHING"));
            }
            other => panic!("expected row error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_wrong_threshold_count() {
        let csv = format!(
            "{HEADER}7,Values,,1,,,,,\n7.1,Values,,1,,,,,\n7.1.2,Energy,ENUM_OPTION_COUNT,1,,,,,90;80\n"
        );
        let err = from_reader(Cursor::new(csv)).expect_err("threshold count enforced");
        assert!(err.to_string().contains("four point thresholds"));
    }

    #[test]
    fn surfaces_hierarchy_errors() {
        let csv = format!("{HEADER}7.1.2,Energy,ENUM_OPTION_COUNT,1,,,,,\n");
        match from_reader(Cursor::new(csv)) {
            Err(CatalogImportError::Catalog(CatalogError::MissingGroup { .. })) => {}
            other => panic!("expected missing group, got {other:?}"),
        }
    }

    #[test]
    fn from_path_propagates_io_errors() {
        match from_path("./does-not-exist.csv") {
            Err(CatalogImportError::Io(_)) => {}
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
