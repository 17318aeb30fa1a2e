pub mod import;
mod standard;

use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{GroupKey, MetricCode, ScoringKind};

/// Default bands mapping a tiered metric percentage to grade points 4/3/2/1.
pub const DEFAULT_POINT_THRESHOLDS: [f64; 4] = [100.0, 75.0, 50.0, 25.0];
/// Selection count that earns full credit on "any N of the above" metrics.
pub const DEFAULT_CAP_TIER: u32 = 4;
/// Checklist cap meaning "every named item".
const ALL_ITEMS: u32 = 0;

/// Static, seeded description of one leaf metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDefinition {
    pub code: MetricCode,
    pub title: String,
    pub kind: ScoringKind,
    pub weight: f64,
    pub max_score: f64,
    pub cap_tier: u32,
    pub checklist_items: Vec<String>,
    pub repeatable: bool,
    pub point_thresholds: [f64; 4],
}

impl MetricDefinition {
    pub fn new(code: MetricCode, title: impl Into<String>, kind: ScoringKind) -> Self {
        let cap_tier = match kind {
            ScoringKind::BooleanChecklist => ALL_ITEMS,
            _ => DEFAULT_CAP_TIER,
        };
        Self {
            code,
            title: title.into(),
            kind,
            weight: 1.0,
            max_score: 100.0,
            cap_tier,
            checklist_items: Vec::new(),
            repeatable: kind.is_multi_year(),
            point_thresholds: DEFAULT_POINT_THRESHOLDS,
        }
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn max_score(mut self, max_score: f64) -> Self {
        self.max_score = max_score;
        self
    }

    pub fn cap_tier(mut self, cap_tier: u32) -> Self {
        self.cap_tier = cap_tier;
        self
    }

    pub fn checklist<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checklist_items = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn repeatable(mut self, repeatable: bool) -> Self {
        self.repeatable = repeatable;
        self
    }

    pub fn point_thresholds(mut self, thresholds: [f64; 4]) -> Self {
        self.point_thresholds = thresholds;
        self
    }

    /// Tier ceiling used by the "any N of the above" kinds.
    ///
    /// A checklist never needs more ticks than it has items.
    pub fn tier_cap(&self) -> u32 {
        match self.kind {
            ScoringKind::BooleanChecklist => {
                let items = self.checklist_items.len() as u32;
                if self.cap_tier == ALL_ITEMS {
                    items
                } else {
                    self.cap_tier.min(items)
                }
            }
            _ => self.cap_tier,
        }
    }

    /// Legacy 0-4 grade point for a metric percentage.
    pub fn grade_point(&self, percent: f64) -> u8 {
        let met = self
            .point_thresholds
            .iter()
            .filter(|threshold| percent >= **threshold)
            .count();
        met as u8
    }
}

/// Title and weight of a criterion or sub-criterion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupDefinition {
    pub key: GroupKey,
    pub title: String,
    pub weight: f64,
}

/// Catalog validation failures. These indicate deployment data bugs, never user input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("metric {0} is registered more than once")]
    DuplicateMetric(String),
    #[error("group {0} is registered more than once")]
    DuplicateGroup(String),
    #[error("no weight configured for {level} {key}")]
    MissingGroup { level: &'static str, key: String },
    #[error("weight for {key} must be a positive finite number (found {weight})")]
    InvalidWeight { key: String, weight: f64 },
    #[error("metric {0} needs a positive max_score")]
    InvalidMaxScore(String),
    #[error("metric {0} needs a positive cap tier")]
    InvalidCapTier(String),
    #[error("checklist metric {0} declares no items")]
    EmptyChecklist(String),
    #[error("point thresholds for {0} must be finite and non-increasing")]
    InvalidThresholds(String),
    #[error("catalog defines no metrics")]
    Empty,
}

/// Validated set of metric and group definitions the engine scores against.
#[derive(Debug, Clone, Serialize)]
pub struct MetricCatalog {
    metrics: BTreeMap<MetricCode, MetricDefinition>,
    groups: BTreeMap<GroupKey, GroupDefinition>,
}

impl MetricCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Metrics observed in the production forms with their seeded weights.
    pub fn standard() -> Self {
        standard::standard_catalog()
    }

    pub fn metric(&self, code: &MetricCode) -> Option<&MetricDefinition> {
        self.metrics.get(code)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.values()
    }

    pub fn group(&self, key: &GroupKey) -> Option<&GroupDefinition> {
        self.groups.get(key)
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupDefinition> {
        self.groups.values()
    }

    pub fn criteria(&self) -> impl Iterator<Item = &GroupDefinition> {
        self.groups.values().filter(|group| group.key.is_criterion())
    }

    pub fn sub_criteria_of<'a>(
        &'a self,
        criterion: &'a GroupKey,
    ) -> impl Iterator<Item = &'a GroupDefinition> + 'a {
        self.groups.values().filter(move |group| {
            !group.key.is_criterion() && group.key.parent_criterion() == *criterion
        })
    }

    pub fn metrics_of<'a>(
        &'a self,
        sub_criterion: &'a GroupKey,
    ) -> impl Iterator<Item = &'a MetricDefinition> + 'a {
        self.metrics
            .values()
            .filter(move |metric| metric.code.sub_criterion() == *sub_criterion)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Accumulates definitions and validates the hierarchy on `build`.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    metrics: Vec<MetricDefinition>,
    groups: Vec<GroupDefinition>,
}

impl CatalogBuilder {
    pub fn group(mut self, key: GroupKey, title: impl Into<String>, weight: f64) -> Self {
        self.groups.push(GroupDefinition {
            key,
            title: title.into(),
            weight,
        });
        self
    }

    pub fn metric(mut self, definition: MetricDefinition) -> Self {
        self.metrics.push(definition);
        self
    }

    pub fn push_group(&mut self, group: GroupDefinition) {
        self.groups.push(group);
    }

    pub fn push_metric(&mut self, definition: MetricDefinition) {
        self.metrics.push(definition);
    }

    pub fn build(self) -> Result<MetricCatalog, CatalogError> {
        let mut groups = BTreeMap::new();
        for group in self.groups {
            check_weight(&group.key.to_string(), group.weight)?;
            let key = group.key.clone();
            if groups.insert(key.clone(), group).is_some() {
                return Err(CatalogError::DuplicateGroup(key.to_string()));
            }
        }

        let mut metrics = BTreeMap::new();
        for metric in self.metrics {
            validate_metric(&metric)?;

            let sub = metric.code.sub_criterion();
            if !groups.contains_key(&sub) {
                return Err(CatalogError::MissingGroup {
                    level: "sub-criterion",
                    key: sub.to_string(),
                });
            }
            let criterion = metric.code.criterion();
            if !groups.contains_key(&criterion) {
                return Err(CatalogError::MissingGroup {
                    level: "criterion",
                    key: criterion.to_string(),
                });
            }

            let code = metric.code.clone();
            if metrics.insert(code.clone(), metric).is_some() {
                return Err(CatalogError::DuplicateMetric(code.to_string()));
            }
        }

        if metrics.is_empty() {
            return Err(CatalogError::Empty);
        }

        // Groups without metrics would only ever score zero; drop them from the tree.
        groups.retain(|key, _| {
            metrics.keys().any(|code: &MetricCode| {
                if key.is_criterion() {
                    code.criterion() == *key
                } else {
                    code.sub_criterion() == *key
                }
            })
        });

        Ok(MetricCatalog { metrics, groups })
    }
}

fn check_weight(key: &str, weight: f64) -> Result<(), CatalogError> {
    if weight.is_finite() && weight > 0.0 {
        Ok(())
    } else {
        Err(CatalogError::InvalidWeight {
            key: key.to_string(),
            weight,
        })
    }
}

fn validate_metric(metric: &MetricDefinition) -> Result<(), CatalogError> {
    let code = metric.code.to_string();
    check_weight(&code, metric.weight)?;

    if !(metric.max_score.is_finite() && metric.max_score > 0.0) {
        return Err(CatalogError::InvalidMaxScore(code));
    }

    match metric.kind {
        ScoringKind::BooleanChecklist if metric.checklist_items.is_empty() => {
            return Err(CatalogError::EmptyChecklist(code));
        }
        ScoringKind::EnumOptionCount | ScoringKind::BooleanChecklist
            if metric.tier_cap() == 0 =>
        {
            return Err(CatalogError::InvalidCapTier(code));
        }
        _ => {}
    }

    let thresholds = &metric.point_thresholds;
    let ordered = thresholds.windows(2).all(|pair| pair[0] >= pair[1]);
    if !ordered || thresholds.iter().any(|value| !value.is_finite()) {
        return Err(CatalogError::InvalidThresholds(code));
    }

    Ok(())
}
