use chrono::{DateTime, Utc};
use serde::Serialize;

use super::aggregate::{
    CriterionNode, MetricNode, NodeStatus, PartialScoreError, ScoreTree, SubCriterionNode,
};
use super::domain::{GroupKey, InstitutionId, MetricCode, SessionYear};
use super::grade::GradeBand;

/// Dashboard status of a node relative to the institution's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    MetTarget,
    BelowTarget,
    NoData,
    Error,
}

impl TargetStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::MetTarget => "Met Target",
            Self::BelowTarget => "Below Target",
            Self::NoData => "No Data",
            Self::Error => "Error",
        }
    }

    fn classify(percent: f64, target: f64, has_data: bool, failed: bool) -> Self {
        if failed {
            Self::Error
        } else if !has_data {
            Self::NoData
        } else if percent >= target {
            Self::MetTarget
        } else {
            Self::BelowTarget
        }
    }
}

/// Shape consumed by the per-metric provisional score panels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricScoreView {
    pub institution_id: InstitutionId,
    pub session: SessionYear,
    pub metric_code: MetricCode,
    pub score_sub_sub_criteria: f64,
    pub score_sub_criteria: f64,
    pub score_criteria: f64,
    pub score_overall: f64,
    pub grade: GradeBand,
    pub sub_sub_cr_grade: u8,
    pub status: NodeStatus,
    pub partial: bool,
    pub computed_at: DateTime<Utc>,
}

impl MetricScoreView {
    pub fn from_tree(tree: &ScoreTree, code: &MetricCode) -> Option<Self> {
        let (criterion, sub, metric) = tree.metric_path(code)?;
        Some(Self {
            institution_id: tree.institution_id.clone(),
            session: tree.session_year,
            metric_code: metric.code.clone(),
            score_sub_sub_criteria: round2(metric.percent),
            score_sub_criteria: round2(sub.percent),
            score_criteria: round2(criterion.percent),
            score_overall: round2(tree.percent),
            grade: metric.grade,
            sub_sub_cr_grade: metric.grade_point,
            status: metric.status,
            partial: sub.partial,
            computed_at: tree.computed_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub code: MetricCode,
    pub title: String,
    pub score: f64,
    pub target: f64,
    pub grade_point: u8,
    pub status: TargetStatus,
    pub status_label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubCriterionSummary {
    pub key: GroupKey,
    pub title: String,
    pub weight: f64,
    pub score: f64,
    pub target: f64,
    pub grade: GradeBand,
    pub status: TargetStatus,
    pub status_label: &'static str,
    pub metrics: Vec<MetricSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionSummary {
    pub key: GroupKey,
    pub title: String,
    pub weight: f64,
    pub score: f64,
    pub target: f64,
    pub grade: GradeBand,
    pub status: TargetStatus,
    pub status_label: &'static str,
    pub sub_criteria: Vec<SubCriterionSummary>,
}

/// Whole-institution dashboard tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstitutionSummary {
    pub institution_id: InstitutionId,
    pub session: SessionYear,
    pub target_grade: GradeBand,
    pub score: f64,
    pub target: f64,
    pub grade: GradeBand,
    pub status: TargetStatus,
    pub status_label: &'static str,
    pub partial: bool,
    pub computed_at: DateTime<Utc>,
    pub criteria: Vec<CriterionSummary>,
    pub errors: Vec<PartialScoreError>,
}

impl InstitutionSummary {
    pub fn from_tree(tree: &ScoreTree, target_grade: GradeBand, target: f64) -> Self {
        let status = TargetStatus::classify(tree.percent, target, tree.submitted > 0, tree.partial);
        Self {
            institution_id: tree.institution_id.clone(),
            session: tree.session_year,
            target_grade,
            score: round2(tree.percent),
            target: round2(target),
            grade: tree.grade,
            status,
            status_label: status.label(),
            partial: tree.partial,
            computed_at: tree.computed_at,
            criteria: tree
                .criteria
                .iter()
                .map(|criterion| criterion_summary(criterion, target))
                .collect(),
            errors: tree.errors.clone(),
        }
    }
}

fn criterion_summary(node: &CriterionNode, target: f64) -> CriterionSummary {
    let status = TargetStatus::classify(node.percent, target, node.submitted > 0, node.partial);
    CriterionSummary {
        key: node.key.clone(),
        title: node.title.clone(),
        weight: node.weight,
        score: round2(node.percent),
        target: round2(target),
        grade: node.grade,
        status,
        status_label: status.label(),
        sub_criteria: node
            .sub_criteria
            .iter()
            .map(|sub| sub_criterion_summary(sub, target))
            .collect(),
    }
}

fn sub_criterion_summary(node: &SubCriterionNode, target: f64) -> SubCriterionSummary {
    let status = TargetStatus::classify(node.percent, target, node.submitted > 0, node.partial);
    SubCriterionSummary {
        key: node.key.clone(),
        title: node.title.clone(),
        weight: node.weight,
        score: round2(node.percent),
        target: round2(target),
        grade: node.grade,
        status,
        status_label: status.label(),
        metrics: node
            .metrics
            .iter()
            .map(|metric| metric_summary(metric, target))
            .collect(),
    }
}

fn metric_summary(node: &MetricNode, target: f64) -> MetricSummary {
    let status = TargetStatus::classify(
        node.percent,
        target,
        node.status == NodeStatus::Scored,
        node.status == NodeStatus::Error,
    );
    MetricSummary {
        code: node.code.clone(),
        title: node.title.clone(),
        score: round2(node.percent),
        target: round2(target),
        grade_point: node.grade_point,
        status,
        status_label: status.label(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
