use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::aggregate::{Aggregator, ScoreLevel, ScoreSnapshot, ScoreTree};
use super::catalog::MetricCatalog;
use super::domain::{
    GroupKey, InstitutionId, MetricCode, MetricResponse, ResponseId, ResponseSubmission,
    ResponseUpdate, SessionYear,
};
use super::grade::{GradeBand, GradeScale, InvariantViolation};
use super::repository::{Cardinality, RepositoryError, ResponseFilter, ResponseRepository};
use super::rules::RuleRegistry;
use super::validation::{SubmissionGuard, ValidationError};
use super::views::{InstitutionSummary, MetricScoreView};

/// Result of a read that may legitimately find nothing to score.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreLookup<T> {
    Found(T),
    NoData,
}

impl<T> ScoreLookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            ScoreLookup::Found(value) => Some(value),
            ScoreLookup::NoData => None,
        }
    }
}

/// Scored trees kept before the cache is flushed.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
struct CachedTree {
    revision: u64,
    tree: Arc<ScoreTree>,
}

/// Service composing the submission guard, repository, aggregator, and snapshot cache.
pub struct ScoringService<R> {
    repository: Arc<R>,
    guard: SubmissionGuard,
    aggregator: Aggregator,
    default_target: GradeBand,
    cache: Mutex<HashMap<(InstitutionId, SessionYear), CachedTree>>,
    cache_capacity: usize,
}

impl<R> ScoringService<R>
where
    R: ResponseRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        catalog: Arc<MetricCatalog>,
        registry: RuleRegistry,
        scale: GradeScale,
    ) -> Self {
        Self {
            repository,
            guard: SubmissionGuard::new(Arc::clone(&catalog)),
            aggregator: Aggregator::new(catalog, registry, scale),
            default_target: GradeBand::A,
            cache: Mutex::new(HashMap::new()),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    pub fn with_default_target(mut self, target: GradeBand) -> Self {
        self.default_target = target;
        self
    }

    pub fn catalog(&self) -> &MetricCatalog {
        self.aggregator.catalog()
    }

    pub fn scale(&self) -> &GradeScale {
        self.aggregator.scale()
    }

    pub fn default_target(&self) -> GradeBand {
        self.default_target
    }

    /// Validate and store a new response.
    pub fn submit(
        &self,
        submission: ResponseSubmission,
    ) -> Result<MetricResponse, ScoringServiceError> {
        let draft = self.guard.response_from_submission(submission, Utc::now())?;
        let definition = self.guard.definition(&draft.metric_code)?;
        let cardinality = Cardinality::for_repeatable(definition.repeatable);

        let stored = self.repository.insert(draft, cardinality)?;
        tracing::info!(
            response_id = %stored.id,
            institution = %stored.institution_id,
            session = %stored.session_year,
            metric = %stored.metric_code,
            "metric response stored"
        );
        Ok(stored)
    }

    /// Replace the payload of an existing response under an optimistic version check.
    pub fn update(
        &self,
        id: ResponseId,
        update: ResponseUpdate,
    ) -> Result<MetricResponse, ScoringServiceError> {
        let existing = self.get_response(id)?;
        self.guard
            .check_update(&existing.metric_code, &update.payload)?;

        let stored =
            self.repository
                .update(id, update.expected_version, update.payload, Utc::now())?;
        tracing::info!(
            response_id = %stored.id,
            version = stored.version,
            "metric response updated"
        );
        Ok(stored)
    }

    pub fn delete(&self, id: ResponseId) -> Result<MetricResponse, ScoringServiceError> {
        let removed = self.repository.delete(id)?;
        tracing::info!(
            response_id = %removed.id,
            institution = %removed.institution_id,
            metric = %removed.metric_code,
            "metric response deleted"
        );
        Ok(removed)
    }

    pub fn get_response(&self, id: ResponseId) -> Result<MetricResponse, ScoringServiceError> {
        let response = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(response)
    }

    pub fn list_responses(
        &self,
        filter: &ResponseFilter,
    ) -> Result<Vec<MetricResponse>, ScoringServiceError> {
        Ok(self.repository.list(filter)?)
    }

    /// Current score tree, recomputed unless the cached entry matches the store revision.
    pub fn score_tree(
        &self,
        institution: &InstitutionId,
        session: SessionYear,
    ) -> Result<ScoreLookup<Arc<ScoreTree>>, ScoringServiceError> {
        let key = (institution.clone(), session);
        let revision = self.repository.revision(institution)?;

        if let Some(cached) = self.cached(&key, revision) {
            tracing::debug!(%institution, %session, revision, "score cache hit");
            return Ok(ScoreLookup::Found(cached.tree));
        }

        let earliest = self.aggregator.registry().earliest_year(session);
        let snapshot = self.repository.snapshot(institution, earliest, session)?;
        let tree = self
            .aggregator
            .aggregate(institution, session, &snapshot.responses)?
            .map(Arc::new);

        if let Some(tree) = tree.as_deref() {
            for failure in &tree.errors {
                tracing::error!(
                    %institution,
                    %session,
                    metric = %failure.code,
                    error = %failure.message,
                    "metric excluded from aggregate score"
                );
            }
        }
        tracing::debug!(
            %institution,
            %session,
            revision = snapshot.revision,
            rows = snapshot.responses.len(),
            "score tree recomputed"
        );

        // NoData lookups are never cached.
        if let Some(tree) = tree.as_ref() {
            self.remember(key, snapshot.revision, Arc::clone(tree));
        }

        Ok(lookup(tree))
    }

    fn remember(&self, key: (InstitutionId, SessionYear), revision: u64, tree: Arc<ScoreTree>) {
        let Ok(mut cache) = self.cache.lock() else {
            return;
        };

        cache.retain(|(institution, _), entry| {
            *institution != key.0 || entry.revision == revision
        });
        if cache.len() >= self.cache_capacity {
            tracing::debug!(entries = cache.len(), "score cache full, flushing");
            cache.clear();
        }
        cache.insert(key, CachedTree { revision, tree });
    }

    #[cfg(test)]
    pub(crate) fn cached_trees(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or_default()
    }

    fn cached(&self, key: &(InstitutionId, SessionYear), revision: u64) -> Option<CachedTree> {
        let cache = self.cache.lock().ok()?;
        cache
            .get(key)
            .filter(|entry| entry.revision == revision)
            .cloned()
    }

    /// Score of one node. Unknown keys are an error; a known key without data is `NoData`.
    pub fn get_score(
        &self,
        institution: &InstitutionId,
        session: SessionYear,
        level: ScoreLevel,
        key: &str,
    ) -> Result<ScoreLookup<ScoreSnapshot>, ScoringServiceError> {
        let key = self.canonical_key(level, key)?;

        let tree = match self.score_tree(institution, session)? {
            ScoreLookup::Found(tree) => tree,
            ScoreLookup::NoData => return Ok(ScoreLookup::NoData),
        };

        Ok(lookup(tree.find(level, &key)))
    }

    /// Metric score with the scores of its ancestors.
    pub fn metric_score(
        &self,
        institution: &InstitutionId,
        session: SessionYear,
        code: &MetricCode,
    ) -> Result<ScoreLookup<MetricScoreView>, ScoringServiceError> {
        if self.catalog().metric(code).is_none() {
            return Err(ScoringServiceError::UnknownNode {
                level: ScoreLevel::Metric,
                key: code.to_string(),
            });
        }

        let tree = match self.score_tree(institution, session)? {
            ScoreLookup::Found(tree) => tree,
            ScoreLookup::NoData => return Ok(ScoreLookup::NoData),
        };

        Ok(lookup(MetricScoreView::from_tree(&tree, code)))
    }

    /// Dashboard tree compared against the desired grade (service default when absent).
    pub fn summary(
        &self,
        institution: &InstitutionId,
        session: SessionYear,
        target_grade: Option<GradeBand>,
    ) -> Result<ScoreLookup<InstitutionSummary>, ScoringServiceError> {
        let desired = target_grade.unwrap_or(self.default_target);
        let target = self.scale().target_percent(desired);

        let tree = match self.score_tree(institution, session)? {
            ScoreLookup::Found(tree) => tree,
            ScoreLookup::NoData => return Ok(ScoreLookup::NoData),
        };

        Ok(ScoreLookup::Found(InstitutionSummary::from_tree(
            &tree,
            desired.as_target(),
            target,
        )))
    }

    /// Normalized key of a catalog node (`07.1.02` -> `7.1.2`).
    fn canonical_key(&self, level: ScoreLevel, key: &str) -> Result<String, ScoringServiceError> {
        let catalog = self.catalog();
        let known = match level {
            ScoreLevel::Overall => Some(ScoreLevel::Overall.label().to_string()),
            ScoreLevel::Metric => MetricCode::parse(key)
                .ok()
                .filter(|code| catalog.metric(code).is_some())
                .map(|code| code.to_string()),
            ScoreLevel::SubCriterion | ScoreLevel::Criterion => GroupKey::parse(key)
                .filter(|group| group.is_criterion() == (level == ScoreLevel::Criterion))
                .filter(|group| catalog.group(group).is_some())
                .map(|group| group.to_string()),
        };

        known.ok_or_else(|| ScoringServiceError::UnknownNode {
            level,
            key: key.to_string(),
        })
    }
}

fn lookup<T>(value: Option<T>) -> ScoreLookup<T> {
    match value {
        Some(value) => ScoreLookup::Found(value),
        None => ScoreLookup::NoData,
    }
}

/// Error raised by the scoring service.
#[derive(Debug, thiserror::Error)]
pub enum ScoringServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error("no {} named '{key}' in the catalog", .level.label())]
    UnknownNode { level: ScoreLevel, key: String },
}
