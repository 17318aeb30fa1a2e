use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use super::catalog::{MetricCatalog, MetricDefinition};
use super::domain::{MetricCode, MetricPayload, MetricResponse, ScoringKind, SessionYear};

/// Trailing window read by the five-year kinds.
pub const DEFAULT_WINDOW_YEARS: u8 = 5;

/// Whether a metric had any data to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    Scored,
    NotSubmitted,
}

/// Percentage produced by a scoring rule for one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricScore {
    pub percent: f64,
    pub status: MetricStatus,
    pub years_counted: usize,
}

impl MetricScore {
    pub fn not_submitted() -> Self {
        Self {
            percent: 0.0,
            status: MetricStatus::NotSubmitted,
            years_counted: 0,
        }
    }

    fn scored(percent: f64, years_counted: usize) -> Self {
        Self {
            percent,
            status: MetricStatus::Scored,
            years_counted,
        }
    }
}

/// Deployment or catalog bugs surfaced while scoring. Never caused by user input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("metric {0} is not defined in the catalog")]
    UnknownMetric(String),
    #[error("no scoring rule registered for {kind} (metric {code})")]
    MissingRule { code: String, kind: &'static str },
    #[error("stored {found} payload cannot feed {kind} metric {code}")]
    PayloadMismatch {
        code: String,
        kind: &'static str,
        found: &'static str,
    },
}

/// Inputs a rule sees: the definition plus the responses inside its read window.
pub struct RuleInput<'a> {
    pub definition: &'a MetricDefinition,
    pub session: SessionYear,
    pub responses: Vec<&'a MetricResponse>,
}

/// Pure function from a metric's responses to a 0-100 percentage.
pub trait ScoringRule: Send + Sync {
    fn score(&self, input: &RuleInput<'_>) -> Result<MetricScore, ConfigurationError>;
}

/// Maps each scoring kind to the rule that implements it.
#[derive(Clone)]
pub struct RuleRegistry {
    rules: BTreeMap<ScoringKind, Arc<dyn ScoringRule>>,
    window_years: u8,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("kinds", &self.rules.keys().collect::<Vec<_>>())
            .field("window_years", &self.window_years)
            .finish()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::standard(DEFAULT_WINDOW_YEARS)
    }
}

impl RuleRegistry {
    /// Registry covering every built-in scoring kind.
    pub fn standard(window_years: u8) -> Self {
        let mut rules: BTreeMap<ScoringKind, Arc<dyn ScoringRule>> = BTreeMap::new();
        rules.insert(ScoringKind::EnumOptionCount, Arc::new(TieredCountRule));
        rules.insert(ScoringKind::BooleanChecklist, Arc::new(TieredCountRule));
        rules.insert(ScoringKind::FiveYearAverageRatio, Arc::new(AverageRatioRule));
        rules.insert(ScoringKind::FiveYearAverageCount, Arc::new(AverageCountRule));

        Self {
            rules,
            window_years: window_years.max(1),
        }
    }

    pub fn empty(window_years: u8) -> Self {
        Self {
            rules: BTreeMap::new(),
            window_years: window_years.max(1),
        }
    }

    pub fn with_rule(mut self, kind: ScoringKind, rule: Arc<dyn ScoringRule>) -> Self {
        self.rules.insert(kind, rule);
        self
    }

    pub fn without_rule(mut self, kind: ScoringKind) -> Self {
        self.rules.remove(&kind);
        self
    }

    pub fn window_years(&self) -> u8 {
        self.window_years
    }

    /// Oldest session year that can contribute to a score for `session`.
    pub fn earliest_year(&self, session: SessionYear) -> SessionYear {
        session.window_start(self.window_years)
    }

    /// Whether a response feeds `definition` when scoring `session`.
    pub fn in_window(
        &self,
        definition: &MetricDefinition,
        session: SessionYear,
        response: &MetricResponse,
    ) -> bool {
        if response.metric_code != definition.code {
            return false;
        }
        if definition.kind.is_multi_year() {
            response.session_year >= session.window_start(self.window_years)
                && response.session_year <= session
        } else {
            response.session_year == session
        }
    }

    /// Score `code` using its catalog definition.
    pub fn score_code(
        &self,
        catalog: &MetricCatalog,
        code: &MetricCode,
        session: SessionYear,
        responses: &[MetricResponse],
    ) -> Result<MetricScore, ConfigurationError> {
        let definition = catalog
            .metric(code)
            .ok_or_else(|| ConfigurationError::UnknownMetric(code.to_string()))?;
        self.score(definition, session, responses)
    }

    pub fn score(
        &self,
        definition: &MetricDefinition,
        session: SessionYear,
        responses: &[MetricResponse],
    ) -> Result<MetricScore, ConfigurationError> {
        let rule = self
            .rules
            .get(&definition.kind)
            .ok_or_else(|| ConfigurationError::MissingRule {
                code: definition.code.to_string(),
                kind: definition.kind.label(),
            })?;

        let relevant: Vec<&MetricResponse> = responses
            .iter()
            .filter(|response| self.in_window(definition, session, response))
            .collect();

        if relevant.is_empty() {
            return Ok(MetricScore::not_submitted());
        }

        if let Some(stray) = relevant
            .iter()
            .find(|response| !response.payload.fits(definition.kind))
        {
            return Err(ConfigurationError::PayloadMismatch {
                code: definition.code.to_string(),
                kind: definition.kind.label(),
                found: stray.payload.kind_label(),
            });
        }

        rule.score(&RuleInput {
            definition,
            session,
            responses: relevant,
        })
    }
}

/// `min(n, cap) / cap * 100` over options picked or checklist items ticked.
pub struct TieredCountRule;

impl ScoringRule for TieredCountRule {
    fn score(&self, input: &RuleInput<'_>) -> Result<MetricScore, ConfigurationError> {
        // Single-valued per session; if a catalog marks it repeatable the newest edit wins.
        let Some(latest) = input
            .responses
            .iter()
            .max_by_key(|response| (response.updated_at, response.id))
        else {
            return Ok(MetricScore::not_submitted());
        };

        let definition = input.definition;
        let selected = match &latest.payload {
            MetricPayload::OptionCount { selected } => *selected,
            MetricPayload::Checklist { items } => definition
                .checklist_items
                .iter()
                .filter(|name| items.get(name.as_str()).copied().unwrap_or(false))
                .count() as u32,
            other => {
                return Err(ConfigurationError::PayloadMismatch {
                    code: definition.code.to_string(),
                    kind: definition.kind.label(),
                    found: other.kind_label(),
                })
            }
        };

        let cap = definition.tier_cap().max(1);
        let percent = f64::from(selected.min(cap)) / f64::from(cap) * 100.0;
        Ok(MetricScore::scored(percent, 1))
    }
}

/// Mean over years of `numerator / denominator * 100`, each year clamped to [0, 100].
pub struct AverageRatioRule;

impl ScoringRule for AverageRatioRule {
    fn score(&self, input: &RuleInput<'_>) -> Result<MetricScore, ConfigurationError> {
        let per_year = reduce_by_year(input, |payload| match payload {
            MetricPayload::Ratio {
                numerator,
                denominator,
            } => Some((*numerator, *denominator)),
            _ => None,
        })?;

        Ok(average_years(per_year.values().filter_map(|(num, den)| {
            (*den > 0.0).then(|| clamp_percent(num / den * 100.0))
        })))
    }
}

/// Mean over years of `(amount / base) / max_score * 100`, each year clamped.
pub struct AverageCountRule;

impl ScoringRule for AverageCountRule {
    fn score(&self, input: &RuleInput<'_>) -> Result<MetricScore, ConfigurationError> {
        let per_year = reduce_by_year(input, |payload| match payload {
            MetricPayload::Figures { amount, base } => Some((*amount, *base)),
            _ => None,
        })?;

        let ceiling = input.definition.max_score;
        Ok(average_years(per_year.values().filter_map(|(amount, base)| {
            (*base > 0.0).then(|| clamp_percent(amount / base / ceiling * 100.0))
        })))
    }
}

/// Sums the two figures of every row sharing a session year (programme lists, department rows).
fn reduce_by_year<F>(
    input: &RuleInput<'_>,
    extract: F,
) -> Result<BTreeMap<SessionYear, (f64, f64)>, ConfigurationError>
where
    F: Fn(&MetricPayload) -> Option<(f64, f64)>,
{
    let mut per_year: BTreeMap<SessionYear, (f64, f64)> = BTreeMap::new();
    for response in &input.responses {
        let (top, bottom) =
            extract(&response.payload).ok_or_else(|| ConfigurationError::PayloadMismatch {
                code: input.definition.code.to_string(),
                kind: input.definition.kind.label(),
                found: response.payload.kind_label(),
            })?;
        let entry = per_year.entry(response.session_year).or_default();
        entry.0 += top;
        entry.1 += bottom;
    }
    Ok(per_year)
}

fn average_years<I>(values: I) -> MetricScore
where
    I: Iterator<Item = f64>,
{
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        MetricScore::not_submitted()
    } else {
        MetricScore::scored(sum / count as f64, count)
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}
