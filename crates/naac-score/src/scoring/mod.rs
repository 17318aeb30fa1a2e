//! Aggregate scoring engine for NAAC self-study metrics.
//!
//! Leaf metric responses are scored by a per-kind rule, rolled up through
//! sub-criteria and criteria by configured weights, and mapped to grade bands.
//! Every read recomputes from stored rows unless a cached tree still matches the
//! store revision.

pub mod aggregate;
pub mod catalog;
pub mod domain;
pub mod grade;
pub mod ingest;
pub mod memory;
pub mod repository;
pub mod router;
pub mod rules;
pub mod service;
pub mod validation;
pub mod views;

#[cfg(test)]
mod tests;

pub use aggregate::{
    Aggregator, CriterionNode, MetricNode, NodeStatus, PartialScoreError, ScoreLevel,
    ScoreSnapshot, ScoreTree, SubCriterionNode,
};
pub use catalog::{CatalogError, GroupDefinition, MetricCatalog, MetricDefinition};
pub use domain::{
    GroupKey, InstitutionId, MetricCode, MetricPayload, MetricResponse, ResponseId,
    ResponseSubmission, ResponseUpdate, ScoringKind, SessionYear,
};
pub use grade::{GradeBand, GradeScale, GradeScaleError, InvariantViolation};
pub use memory::MemoryResponseStore;
pub use repository::{Cardinality, RepositoryError, ResponseFilter, ResponseRepository};
pub use router::scoring_router;
pub use rules::{ConfigurationError, MetricScore, MetricStatus, RuleRegistry, ScoringRule};
pub use service::{ScoreLookup, ScoringService, ScoringServiceError};
pub use validation::{SubmissionGuard, ValidationError};
pub use views::{InstitutionSummary, MetricScoreView, TargetStatus};
