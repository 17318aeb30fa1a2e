use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::domain::{InstitutionId, MetricCode, MetricPayload, MetricResponse, ResponseId, SessionYear};

/// How many rows a metric may hold per institution and session year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Repeatable,
}

impl Cardinality {
    pub fn for_repeatable(repeatable: bool) -> Self {
        if repeatable {
            Cardinality::Repeatable
        } else {
            Cardinality::Single
        }
    }
}

/// Optional narrowing for response listings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseFilter {
    pub institution: Option<InstitutionId>,
    pub session: Option<SessionYear>,
    pub metric: Option<MetricCode>,
}

impl ResponseFilter {
    pub fn matches(&self, response: &MetricResponse) -> bool {
        self.institution
            .as_ref()
            .map_or(true, |institution| response.institution_id == *institution)
            && self
                .session
                .map_or(true, |session| response.session_year == session)
            && self
                .metric
                .as_ref()
                .map_or(true, |metric| response.metric_code == *metric)
    }
}

/// Rows for one institution read under a single lock, with the revision they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub revision: u64,
    pub responses: Vec<MetricResponse>,
}

/// Storage abstraction so the service module can be exercised in isolation.
///
/// Every successful write bumps the owning institution's revision.
pub trait ResponseRepository: Send + Sync {
    /// Persist a new row and assign its id. A second row for a `Single` metric in the
    /// same institution and year is a `Conflict`.
    fn insert(
        &self,
        response: MetricResponse,
        cardinality: Cardinality,
    ) -> Result<MetricResponse, RepositoryError>;

    /// Replace the payload when `expected_version` still matches.
    fn update(
        &self,
        id: ResponseId,
        expected_version: u32,
        payload: MetricPayload,
        now: DateTime<Utc>,
    ) -> Result<MetricResponse, RepositoryError>;

    fn delete(&self, id: ResponseId) -> Result<MetricResponse, RepositoryError>;
    fn fetch(&self, id: ResponseId) -> Result<Option<MetricResponse>, RepositoryError>;
    fn list(&self, filter: &ResponseFilter) -> Result<Vec<MetricResponse>, RepositoryError>;

    /// Rows of `institution` with `from <= session_year <= to`.
    fn snapshot(
        &self,
        institution: &InstitutionId,
        from: SessionYear,
        to: SessionYear,
    ) -> Result<StoreSnapshot, RepositoryError>;

    fn revision(&self, institution: &InstitutionId) -> Result<u64, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    #[error("a response for {metric} in session {session} already exists")]
    Conflict { metric: String, session: SessionYear },
    #[error("response not found")]
    NotFound,
    #[error("response was modified concurrently (expected version {expected}, found {found})")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
