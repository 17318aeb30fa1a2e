use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const MIN_SESSION_YEAR: i32 = 1950;
const MAX_SESSION_YEAR: i32 = 2100;

/// Identifier wrapper for a submitting institution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstitutionId(pub String);

impl fmt::Display for InstitutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned to a stored metric response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResponseId(pub u64);

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resp-{:06}", self.0)
    }
}

/// Normalized academic year. `2024-25` and `2024` both resolve to 2024.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionYear(i32);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionYearError {
    #[error("session '{0}' must look like YYYY, YYYY-YY, or YYYY-YYYY")]
    Format(String),
    #[error("session '{0}' spans more than one academic year")]
    Span(String),
    #[error("session year {0} outside supported range 1950..=2100")]
    Range(i32),
}

impl SessionYear {
    pub fn new(year: i32) -> Result<Self, SessionYearError> {
        if (MIN_SESSION_YEAR..=MAX_SESSION_YEAR).contains(&year) {
            Ok(Self(year))
        } else {
            Err(SessionYearError::Range(year))
        }
    }

    pub fn year(self) -> i32 {
        self.0
    }

    /// Oldest year of a trailing window of `years` sessions ending at `self`.
    pub fn window_start(self, years: u8) -> SessionYear {
        let span = i32::from(years.max(1)) - 1;
        SessionYear((self.0 - span).max(MIN_SESSION_YEAR))
    }

    pub fn parse(raw: &str) -> Result<Self, SessionYearError> {
        let trimmed = raw.trim();
        let (start, end) = match trimmed.split_once('-') {
            Some((start, end)) => (start, Some(end)),
            None => (trimmed, None),
        };

        if start.len() != 4 || !start.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SessionYearError::Format(raw.to_string()));
        }
        let year: i32 = start
            .parse()
            .map_err(|_| SessionYearError::Format(raw.to_string()))?;

        if let Some(end) = end {
            if !end.bytes().all(|b| b.is_ascii_digit()) {
                return Err(SessionYearError::Format(raw.to_string()));
            }
            let expected = year + 1;
            let matches = match end.len() {
                2 => end == format!("{:02}", expected % 100),
                4 => end == expected.to_string(),
                _ => return Err(SessionYearError::Format(raw.to_string())),
            };
            if !matches {
                return Err(SessionYearError::Span(raw.to_string()));
            }
        }

        Self::new(year)
    }
}

impl fmt::Display for SessionYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionYear {
    type Err = SessionYearError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SessionYear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.0)
    }
}

impl<'de> Deserialize<'de> for SessionYear {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(year) => SessionYear::new(year).map_err(serde::de::Error::custom),
            Raw::Text(text) => SessionYear::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

/// Dotted leaf code such as `7.1.10`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricCode {
    raw: String,
    parts: [u8; 3],
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a metric code of the form C.S.M (e.g. 7.1.2)")]
pub struct MetricCodeError(pub String);

impl MetricCode {
    pub fn parse(raw: &str) -> Result<Self, MetricCodeError> {
        let parts = parse_dotted(raw.trim()).ok_or_else(|| MetricCodeError(raw.to_string()))?;
        match parts.as_slice() {
            [criterion, sub, metric] if *criterion > 0 && *sub > 0 && *metric > 0 => Ok(Self {
                raw: format!("{criterion}.{sub}.{metric}"),
                parts: [*criterion, *sub, *metric],
            }),
            _ => Err(MetricCodeError(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn criterion(&self) -> GroupKey {
        GroupKey::criterion(self.parts[0])
    }

    pub fn sub_criterion(&self) -> GroupKey {
        GroupKey::sub_criterion(self.parts[0], self.parts[1])
    }

    /// Zero-padded form stored in the legacy `criteria_master` table (`7.1.10` -> `070110`).
    pub fn padded(&self) -> String {
        self.parts.iter().map(|part| format!("{part:02}")).collect()
    }
}

impl fmt::Display for MetricCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for MetricCode {
    type Err = MetricCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MetricCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for MetricCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MetricCode::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Key of a non-leaf node: a criterion (`2`) or a sub-criterion (`2.1`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct GroupKey {
    criterion: u8,
    sub: Option<u8>,
}

impl GroupKey {
    pub fn criterion(criterion: u8) -> Self {
        Self {
            criterion,
            sub: None,
        }
    }

    pub fn sub_criterion(criterion: u8, sub: u8) -> Self {
        Self {
            criterion,
            sub: Some(sub),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match parse_dotted(raw.trim())?.as_slice() {
            [criterion] if *criterion > 0 => Some(Self::criterion(*criterion)),
            [criterion, sub] if *criterion > 0 && *sub > 0 => {
                Some(Self::sub_criterion(*criterion, *sub))
            }
            _ => None,
        }
    }

    pub fn is_criterion(&self) -> bool {
        self.sub.is_none()
    }

    /// Criterion owning this key (itself for criterion keys).
    pub fn parent_criterion(&self) -> GroupKey {
        GroupKey::criterion(self.criterion)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub {
            Some(sub) => write!(f, "{}.{}", self.criterion, sub),
            None => write!(f, "{}", self.criterion),
        }
    }
}

impl From<GroupKey> for String {
    fn from(value: GroupKey) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for GroupKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        GroupKey::parse(&value).ok_or_else(|| format!("'{value}' is not a criterion key"))
    }
}

fn parse_dotted(raw: &str) -> Option<Vec<u8>> {
    if raw.is_empty() {
        return None;
    }
    raw.split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                part.parse::<u8>().ok()
            }
        })
        .collect()
}

/// How raw responses for a metric become a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoringKind {
    EnumOptionCount,
    FiveYearAverageRatio,
    FiveYearAverageCount,
    BooleanChecklist,
}

impl ScoringKind {
    pub const fn label(self) -> &'static str {
        match self {
            ScoringKind::EnumOptionCount => "ENUM_OPTION_COUNT",
            ScoringKind::FiveYearAverageRatio => "FIVE_YEAR_AVERAGE_RATIO",
            ScoringKind::FiveYearAverageCount => "FIVE_YEAR_AVERAGE_COUNT",
            ScoringKind::BooleanChecklist => "BOOLEAN_CHECKLIST",
        }
    }

    /// Whether the metric reads a trailing multi-year window rather than one session.
    pub const fn is_multi_year(self) -> bool {
        matches!(
            self,
            ScoringKind::FiveYearAverageRatio | ScoringKind::FiveYearAverageCount
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "ENUM_OPTION_COUNT" | "OPTION_COUNT" => Some(Self::EnumOptionCount),
            "FIVE_YEAR_AVERAGE_RATIO" | "AVERAGE_RATIO" => Some(Self::FiveYearAverageRatio),
            "FIVE_YEAR_AVERAGE_COUNT" | "AVERAGE_COUNT" => Some(Self::FiveYearAverageCount),
            "BOOLEAN_CHECKLIST" | "CHECKLIST" => Some(Self::BooleanChecklist),
            _ => None,
        }
    }
}

/// Metric-specific answer captured by a form submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricPayload {
    /// Number of checkbox options selected (e.g. 7.1.2 facility types).
    OptionCount { selected: u32 },
    /// Per-year ratio inputs, e.g. students admitted over sanctioned seats.
    Ratio { numerator: f64, denominator: f64 },
    /// Two submitted figures whose quotient is normalized by the metric ceiling.
    Figures { amount: f64, base: f64 },
    /// Named yes/no sub-items (e.g. 7.1.10 code-of-conduct programmes).
    Checklist { items: BTreeMap<String, bool> },
}

impl MetricPayload {
    pub const fn kind_label(&self) -> &'static str {
        match self {
            MetricPayload::OptionCount { .. } => "option_count",
            MetricPayload::Ratio { .. } => "ratio",
            MetricPayload::Figures { .. } => "figures",
            MetricPayload::Checklist { .. } => "checklist",
        }
    }

    /// Whether this payload shape feeds the given scoring kind.
    pub fn fits(&self, kind: ScoringKind) -> bool {
        matches!(
            (self, kind),
            (MetricPayload::OptionCount { .. }, ScoringKind::EnumOptionCount)
                | (MetricPayload::Ratio { .. }, ScoringKind::FiveYearAverageRatio)
                | (MetricPayload::Figures { .. }, ScoringKind::FiveYearAverageCount)
                | (MetricPayload::Checklist { .. }, ScoringKind::BooleanChecklist)
        )
    }
}

/// Inbound form data before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSubmission {
    pub institution_id: String,
    pub session: String,
    pub metric_code: String,
    pub payload: MetricPayload,
}

/// Inbound edit of an existing response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseUpdate {
    pub expected_version: u32,
    pub payload: MetricPayload,
}

/// Stored leaf answer for one metric, institution, and session year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResponse {
    pub id: ResponseId,
    pub institution_id: InstitutionId,
    pub session_year: SessionYear,
    pub metric_code: MetricCode,
    pub payload: MetricPayload,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_year_accepts_academic_formats() {
        assert_eq!(SessionYear::parse("2024").unwrap().year(), 2024);
        assert_eq!(SessionYear::parse("2024-25").unwrap().year(), 2024);
        assert_eq!(SessionYear::parse(" 2024-2025 ").unwrap().year(), 2024);
        assert_eq!(SessionYear::parse("1999-00").unwrap().year(), 1999);
    }

    #[test]
    fn session_year_rejects_ambiguous_formats() {
        assert!(matches!(
            SessionYear::parse("24"),
            Err(SessionYearError::Format(_))
        ));
        assert!(matches!(
            SessionYear::parse("2024/25"),
            Err(SessionYearError::Format(_))
        ));
        assert!(matches!(
            SessionYear::parse("2024-27"),
            Err(SessionYearError::Span(_))
        ));
        assert!(matches!(
            SessionYear::parse("1800"),
            Err(SessionYearError::Range(1800))
        ));
    }

    #[test]
    fn session_year_deserializes_numbers_and_strings() {
        let from_number: SessionYear = serde_json::from_str("2023").unwrap();
        let from_text: SessionYear = serde_json::from_str("\"2023-24\"").unwrap();
        assert_eq!(from_number, from_text);
        assert!(serde_json::from_str::<SessionYear>("\"23-24\"").is_err());
    }

    #[test]
    fn window_start_covers_trailing_years() {
        let session = SessionYear::new(2024).unwrap();
        assert_eq!(session.window_start(5).year(), 2020);
        assert_eq!(session.window_start(1).year(), 2024);
        assert_eq!(session.window_start(0).year(), 2024);
    }

    #[test]
    fn metric_code_derives_hierarchy() {
        let code = MetricCode::parse("7.1.10").unwrap();
        assert_eq!(code.criterion().to_string(), "7");
        assert_eq!(code.sub_criterion().to_string(), "7.1");
        assert_eq!(code.padded(), "070110");
        assert!(MetricCode::parse("7.1").is_err());
        assert!(MetricCode::parse("7..2").is_err());
        assert!(MetricCode::parse("0.1.2").is_err());
    }

    #[test]
    fn group_key_round_trips_through_strings() {
        let key = GroupKey::parse("2.4").unwrap();
        assert!(!key.is_criterion());
        assert_eq!(key.parent_criterion(), GroupKey::criterion(2));
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2.4\"");
        assert!(GroupKey::parse("2.4.1").is_none());
    }

    #[test]
    fn payload_fits_matching_kind_only() {
        let payload = MetricPayload::OptionCount { selected: 3 };
        assert!(payload.fits(ScoringKind::EnumOptionCount));
        assert!(!payload.fits(ScoringKind::BooleanChecklist));
        let parsed: MetricPayload =
            serde_json::from_str(r#"{"type":"ratio","numerator":40,"denominator":60}"#).unwrap();
        assert!(parsed.fits(ScoringKind::FiveYearAverageRatio));
    }
}
