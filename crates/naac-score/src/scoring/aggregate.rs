//! Bottom-up roll-up of metric scores into sub-criterion, criterion, and overall scores.
//!
//! Each level is the weighted mean of its children. A metric with no submission
//! contributes 0. A sub-criterion where nothing was submitted scores 0 and is
//! `Incomplete`, and any parent of an incomplete child is `Incomplete` too. A metric
//! whose rule fails is marked `Error`, contributes 0, and flags every ancestor as
//! `partial` without disturbing its siblings.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::{GroupDefinition, MetricCatalog, MetricDefinition};
use super::domain::{GroupKey, InstitutionId, MetricCode, MetricResponse, ScoringKind, SessionYear};
use super::grade::{GradeBand, GradeScale, InvariantViolation};
use super::rules::{MetricStatus, RuleRegistry};

/// Level of a node in the score tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreLevel {
    Metric,
    SubCriterion,
    Criterion,
    Overall,
}

impl ScoreLevel {
    pub const fn label(self) -> &'static str {
        match self {
            ScoreLevel::Metric => "metric",
            ScoreLevel::SubCriterion => "sub_criterion",
            ScoreLevel::Criterion => "criterion",
            ScoreLevel::Overall => "overall",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "metric" | "sub_sub_criterion" => Some(Self::Metric),
            "sub_criterion" => Some(Self::SubCriterion),
            "criterion" => Some(Self::Criterion),
            "overall" | "institution" => Some(Self::Overall),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Scored,
    NotSubmitted,
    Incomplete,
    Error,
}

/// A metric whose rule failed; carried on the tree instead of failing the whole read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialScoreError {
    pub code: MetricCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricNode {
    pub code: MetricCode,
    pub title: String,
    pub kind: ScoringKind,
    pub weight: f64,
    pub percent: f64,
    pub grade: GradeBand,
    pub grade_point: u8,
    pub years_counted: usize,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubCriterionNode {
    pub key: GroupKey,
    pub title: String,
    pub weight: f64,
    pub percent: f64,
    pub grade: GradeBand,
    pub status: NodeStatus,
    pub partial: bool,
    pub submitted: usize,
    pub metrics: Vec<MetricNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionNode {
    pub key: GroupKey,
    pub title: String,
    pub weight: f64,
    pub percent: f64,
    pub grade: GradeBand,
    pub status: NodeStatus,
    pub partial: bool,
    pub submitted: usize,
    pub sub_criteria: Vec<SubCriterionNode>,
}

/// Fully computed scores for one institution and session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreTree {
    pub institution_id: InstitutionId,
    pub session_year: SessionYear,
    pub percent: f64,
    pub grade: GradeBand,
    pub status: NodeStatus,
    pub partial: bool,
    pub submitted: usize,
    /// Newest `updated_at` among contributing responses.
    pub computed_at: DateTime<Utc>,
    pub criteria: Vec<CriterionNode>,
    pub errors: Vec<PartialScoreError>,
}

/// Flat view of one node, as served by score queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSnapshot {
    pub institution_id: InstitutionId,
    pub session_year: SessionYear,
    pub level: ScoreLevel,
    pub key: String,
    pub score_percent: f64,
    pub grade: GradeBand,
    pub status: NodeStatus,
    pub partial: bool,
    pub computed_at: DateTime<Utc>,
}

impl ScoreTree {
    fn snapshot(
        &self,
        level: ScoreLevel,
        key: String,
        percent: f64,
        grade: GradeBand,
        status: NodeStatus,
        partial: bool,
    ) -> ScoreSnapshot {
        ScoreSnapshot {
            institution_id: self.institution_id.clone(),
            session_year: self.session_year,
            level,
            key,
            score_percent: percent,
            grade,
            status,
            partial,
            computed_at: self.computed_at,
        }
    }

    /// Every node in code order, overall first.
    pub fn snapshots(&self) -> Vec<ScoreSnapshot> {
        let mut out = vec![self.snapshot(
            ScoreLevel::Overall,
            ScoreLevel::Overall.label().to_string(),
            self.percent,
            self.grade,
            self.status,
            self.partial,
        )];

        for criterion in &self.criteria {
            out.push(self.snapshot(
                ScoreLevel::Criterion,
                criterion.key.to_string(),
                criterion.percent,
                criterion.grade,
                criterion.status,
                criterion.partial,
            ));
            for sub in &criterion.sub_criteria {
                out.push(self.snapshot(
                    ScoreLevel::SubCriterion,
                    sub.key.to_string(),
                    sub.percent,
                    sub.grade,
                    sub.status,
                    sub.partial,
                ));
                for metric in &sub.metrics {
                    out.push(self.snapshot(
                        ScoreLevel::Metric,
                        metric.code.to_string(),
                        metric.percent,
                        metric.grade,
                        metric.status,
                        false,
                    ));
                }
            }
        }

        out
    }

    pub fn find(&self, level: ScoreLevel, key: &str) -> Option<ScoreSnapshot> {
        let key = key.trim();
        self.snapshots()
            .into_iter()
            .find(|snapshot| snapshot.level == level && (level == ScoreLevel::Overall || snapshot.key == key))
    }

    /// The metric node with its sub-criterion and criterion ancestors.
    pub fn metric_path(
        &self,
        code: &MetricCode,
    ) -> Option<(&CriterionNode, &SubCriterionNode, &MetricNode)> {
        let criterion = self
            .criteria
            .iter()
            .find(|criterion| criterion.key == code.criterion())?;
        let sub = criterion
            .sub_criteria
            .iter()
            .find(|sub| sub.key == code.sub_criterion())?;
        let metric = sub.metrics.iter().find(|metric| metric.code == *code)?;
        Some((criterion, sub, metric))
    }
}

/// Pure function from stored responses to a [`ScoreTree`].
#[derive(Debug, Clone)]
pub struct Aggregator {
    catalog: Arc<MetricCatalog>,
    registry: RuleRegistry,
    scale: GradeScale,
}

impl Aggregator {
    pub fn new(catalog: Arc<MetricCatalog>, registry: RuleRegistry, scale: GradeScale) -> Self {
        Self {
            catalog,
            registry,
            scale,
        }
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn scale(&self) -> &GradeScale {
        &self.scale
    }

    /// Score `session` for `institution`; `None` when no response feeds any metric.
    pub fn aggregate(
        &self,
        institution: &InstitutionId,
        session: SessionYear,
        responses: &[MetricResponse],
    ) -> Result<Option<ScoreTree>, InvariantViolation> {
        let responses: Vec<MetricResponse> = responses
            .iter()
            .filter(|response| response.institution_id == *institution)
            .cloned()
            .collect();

        let watermark = responses
            .iter()
            .filter(|response| {
                self.catalog
                    .metric(&response.metric_code)
                    .is_some_and(|definition| self.registry.in_window(definition, session, response))
            })
            .map(|response| response.updated_at)
            .max();

        let Some(computed_at) = watermark else {
            return Ok(None);
        };

        let mut errors = Vec::new();
        let mut criteria = Vec::new();
        for criterion in self.catalog.criteria() {
            criteria.push(self.criterion_node(criterion, session, &responses, &mut errors)?);
        }

        let (percent, partial, submitted, status) = roll_up(
            criteria
                .iter()
                .map(|node| (node.weight, node.percent, node.partial, node.submitted, node.status)),
        );

        Ok(Some(ScoreTree {
            institution_id: institution.clone(),
            session_year: session,
            percent,
            grade: self.scale.grade_for(percent)?,
            status,
            partial,
            submitted,
            computed_at,
            criteria,
            errors,
        }))
    }

    fn criterion_node(
        &self,
        criterion: &GroupDefinition,
        session: SessionYear,
        responses: &[MetricResponse],
        errors: &mut Vec<PartialScoreError>,
    ) -> Result<CriterionNode, InvariantViolation> {
        let mut sub_criteria = Vec::new();
        for sub in self.catalog.sub_criteria_of(&criterion.key) {
            sub_criteria.push(self.sub_criterion_node(sub, session, responses, errors)?);
        }

        let (percent, partial, submitted, status) = roll_up(
            sub_criteria
                .iter()
                .map(|node| (node.weight, node.percent, node.partial, node.submitted, node.status)),
        );

        Ok(CriterionNode {
            key: criterion.key.clone(),
            title: criterion.title.clone(),
            weight: criterion.weight,
            percent,
            grade: self.scale.grade_for(percent)?,
            status,
            partial,
            submitted,
            sub_criteria,
        })
    }

    fn sub_criterion_node(
        &self,
        sub: &GroupDefinition,
        session: SessionYear,
        responses: &[MetricResponse],
        errors: &mut Vec<PartialScoreError>,
    ) -> Result<SubCriterionNode, InvariantViolation> {
        let mut metrics = Vec::new();
        for definition in self.catalog.metrics_of(&sub.key) {
            metrics.push(self.metric_node(definition, session, responses, errors)?);
        }

        let percent = weighted_mean(metrics.iter().map(|node| (node.weight, node.percent)));
        let partial = metrics.iter().any(|node| node.status == NodeStatus::Error);
        let submitted = metrics
            .iter()
            .filter(|node| node.status == NodeStatus::Scored)
            .count();
        let status = if submitted == 0 {
            NodeStatus::Incomplete
        } else {
            NodeStatus::Scored
        };

        Ok(SubCriterionNode {
            key: sub.key.clone(),
            title: sub.title.clone(),
            weight: sub.weight,
            percent,
            grade: self.scale.grade_for(percent)?,
            status,
            partial,
            submitted,
            metrics,
        })
    }

    fn metric_node(
        &self,
        definition: &MetricDefinition,
        session: SessionYear,
        responses: &[MetricResponse],
        errors: &mut Vec<PartialScoreError>,
    ) -> Result<MetricNode, InvariantViolation> {
        let (percent, years_counted, status) =
            match self.registry.score(definition, session, responses) {
                Ok(score) => {
                    let status = match score.status {
                        MetricStatus::Scored => NodeStatus::Scored,
                        MetricStatus::NotSubmitted => NodeStatus::NotSubmitted,
                    };
                    (score.percent, score.years_counted, status)
                }
                Err(err) => {
                    tracing::warn!(
                        metric = %definition.code,
                        error = %err,
                        "metric rule failed; scoring it as zero"
                    );
                    errors.push(PartialScoreError {
                        code: definition.code.clone(),
                        message: err.to_string(),
                    });
                    (0.0, 0, NodeStatus::Error)
                }
            };

        let grade_point = if status == NodeStatus::Scored {
            definition.grade_point(percent)
        } else {
            0
        };

        Ok(MetricNode {
            code: definition.code.clone(),
            title: definition.title.clone(),
            kind: definition.kind,
            weight: definition.weight,
            percent,
            grade: self.scale.grade_for(percent)?,
            grade_point,
            years_counted,
            status,
        })
    }
}

fn weighted_mean<I>(children: I) -> f64
where
    I: Iterator<Item = (f64, f64)>,
{
    let (weighted, total) = children.fold((0.0, 0.0), |(weighted, total), (weight, percent)| {
        (weighted + weight * percent, total + weight)
    });
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

/// Percent, partial flag, submitted count, and status of a group node.
fn roll_up<I>(children: I) -> (f64, bool, usize, NodeStatus)
where
    I: Iterator<Item = (f64, f64, bool, usize, NodeStatus)> + Clone,
{
    let percent = weighted_mean(children.clone().map(|(weight, percent, ..)| (weight, percent)));
    let partial = children.clone().any(|(_, _, partial, ..)| partial);
    let submitted = children.clone().map(|(_, _, _, submitted, _)| submitted).sum();
    let status = if children
        .clone()
        .any(|(.., status)| status == NodeStatus::Incomplete)
    {
        NodeStatus::Incomplete
    } else {
        NodeStatus::Scored
    };
    (percent, partial, submitted, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::domain::{MetricPayload, ResponseId};
    use chrono::TimeZone;

    fn code(raw: &str) -> MetricCode {
        MetricCode::parse(raw).unwrap()
    }

    fn catalog() -> Arc<MetricCatalog> {
        let catalog = MetricCatalog::builder()
            .group(GroupKey::criterion(2), "Teaching-Learning", 0.3)
            .group(GroupKey::sub_criterion(2, 1), "Enrolment", 40.0)
            .group(GroupKey::sub_criterion(2, 6), "Outcomes", 30.0)
            .group(GroupKey::criterion(7), "Institutional Values", 0.1)
            .group(GroupKey::sub_criterion(7, 1), "Social Responsibilities", 1.0)
            .metric(MetricDefinition::new(
                code("2.1.1"),
                "Enrolment",
                ScoringKind::FiveYearAverageRatio,
            ))
            .metric(MetricDefinition::new(
                code("2.6.3"),
                "Pass percentage",
                ScoringKind::FiveYearAverageRatio,
            ))
            .metric(MetricDefinition::new(
                code("7.1.2"),
                "Alternate energy",
                ScoringKind::EnumOptionCount,
            ))
            .metric(
                MetricDefinition::new(code("7.1.10"), "Code of conduct", ScoringKind::BooleanChecklist)
                    .checklist(["code_published", "ethics_programs"]),
            )
            .build()
            .expect("catalog builds");
        Arc::new(catalog)
    }

    fn response(id: u64, metric: &str, year: i32, payload: MetricPayload) -> MetricResponse {
        let at = Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(id as i64);
        MetricResponse {
            id: ResponseId(id),
            institution_id: InstitutionId("college-1".to_string()),
            session_year: SessionYear::new(year).unwrap(),
            metric_code: code(metric),
            payload,
            submitted_at: at,
            updated_at: at,
            version: 1,
        }
    }

    fn institution() -> InstitutionId {
        InstitutionId("college-1".to_string())
    }

    fn session() -> SessionYear {
        SessionYear::new(2024).unwrap()
    }

    fn aggregator(registry: RuleRegistry) -> Aggregator {
        Aggregator::new(catalog(), registry, GradeScale::naac_default())
    }

    #[test]
    fn no_contributing_rows_is_no_data() {
        let stale = vec![response(1, "7.1.2", 2019, MetricPayload::OptionCount { selected: 4 })];
        let tree = aggregator(RuleRegistry::default())
            .aggregate(&institution(), session(), &stale)
            .unwrap();
        assert!(tree.is_none());
    }

    #[test]
    fn weighted_means_roll_up_each_level() {
        let rows = vec![
            response(1, "2.1.1", 2024, MetricPayload::Ratio { numerator: 50.0, denominator: 100.0 }),
            response(2, "2.6.3", 2024, MetricPayload::Ratio { numerator: 100.0, denominator: 100.0 }),
            response(3, "7.1.2", 2024, MetricPayload::OptionCount { selected: 2 }),
        ];
        let tree = aggregator(RuleRegistry::default())
            .aggregate(&institution(), session(), &rows)
            .unwrap()
            .expect("tree computed");

        let (criterion, sub, metric) = tree.metric_path(&code("2.1.1")).unwrap();
        assert_eq!(metric.percent, 50.0);
        assert_eq!(sub.percent, 50.0);
        // (40 * 50 + 30 * 100) / 70
        assert!((criterion.percent - 5000.0 / 70.0).abs() < 1e-9);

        // 7.1 averages 7.1.2 (50) with unsubmitted 7.1.10 (0)
        let (values, values_sub, _) = tree.metric_path(&code("7.1.2")).unwrap();
        assert_eq!(values_sub.percent, 25.0);
        assert_eq!(values_sub.status, NodeStatus::Scored);
        assert_eq!(values.percent, 25.0);

        let expected = (0.3 * (5000.0 / 70.0) + 0.1 * 25.0) / 0.4;
        assert!((tree.percent - expected).abs() < 1e-9);
        assert_eq!(tree.status, NodeStatus::Scored);
        assert_eq!(tree.computed_at, rows[2].updated_at);
    }

    #[test]
    fn empty_sub_criterion_is_incomplete_up_the_tree() {
        let rows = vec![response(1, "2.1.1", 2024, MetricPayload::Ratio { numerator: 1.0, denominator: 1.0 })];
        let tree = aggregator(RuleRegistry::default())
            .aggregate(&institution(), session(), &rows)
            .unwrap()
            .unwrap();

        let (criterion, outcomes, metric) = tree.metric_path(&code("2.6.3")).unwrap();
        assert_eq!(metric.status, NodeStatus::NotSubmitted);
        assert_eq!(outcomes.status, NodeStatus::Incomplete);
        assert_eq!(outcomes.percent, 0.0);
        assert_eq!(criterion.status, NodeStatus::Incomplete);
        assert_eq!(tree.status, NodeStatus::Incomplete);
        assert_eq!(tree.submitted, 1);
    }

    #[test]
    fn rule_failure_is_isolated_to_its_branch() {
        let mut items = std::collections::BTreeMap::new();
        items.insert("code_published".to_string(), true);
        let rows = vec![
            response(1, "7.1.2", 2024, MetricPayload::OptionCount { selected: 3 }),
            response(2, "7.1.10", 2024, MetricPayload::Checklist { items }),
            response(3, "2.1.1", 2024, MetricPayload::Ratio { numerator: 9.0, denominator: 10.0 }),
        ];
        let registry = RuleRegistry::default().without_rule(ScoringKind::BooleanChecklist);
        let tree = aggregator(registry)
            .aggregate(&institution(), session(), &rows)
            .unwrap()
            .unwrap();

        assert_eq!(tree.errors.len(), 1);
        assert_eq!(tree.errors[0].code, code("7.1.10"));

        let (values, values_sub, conduct) = tree.metric_path(&code("7.1.10")).unwrap();
        assert_eq!(conduct.status, NodeStatus::Error);
        assert!(values_sub.partial && values.partial && tree.partial);

        let (_, _, energy) = tree.metric_path(&code("7.1.2")).unwrap();
        assert_eq!(energy.percent, 75.0);

        let (teaching, _, enrolment) = tree.metric_path(&code("2.1.1")).unwrap();
        assert!(!teaching.partial);
        assert_eq!(enrolment.percent, 90.0);
    }

    #[test]
    fn snapshots_cover_every_node_in_order() {
        let rows = vec![response(1, "7.1.2", 2024, MetricPayload::OptionCount { selected: 4 })];
        let tree = aggregator(RuleRegistry::default())
            .aggregate(&institution(), session(), &rows)
            .unwrap()
            .unwrap();

        let snapshots = tree.snapshots();
        assert_eq!(snapshots.len(), 1 + 2 + 3 + 4);
        assert_eq!(snapshots[0].level, ScoreLevel::Overall);
        assert_eq!(snapshots[1].key, "2");

        let metric = tree.find(ScoreLevel::Metric, "7.1.2").unwrap();
        assert_eq!(metric.score_percent, 100.0);
        assert_eq!(metric.grade, GradeBand::APlusPlus);
        assert!(tree.find(ScoreLevel::Criterion, "9").is_none());
    }

    #[test]
    fn other_institutions_rows_are_ignored() {
        let mut foreign = response(1, "7.1.2", 2024, MetricPayload::OptionCount { selected: 4 });
        foreign.institution_id = InstitutionId("college-2".to_string());
        let tree = aggregator(RuleRegistry::default())
            .aggregate(&institution(), session(), &[foreign])
            .unwrap();
        assert!(tree.is_none());
    }
}
