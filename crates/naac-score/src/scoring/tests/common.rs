use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::scoring::catalog::MetricCatalog;
use crate::scoring::domain::{
    InstitutionId, MetricPayload, MetricResponse, ResponseId, ResponseSubmission, SessionYear,
};
use crate::scoring::grade::GradeScale;
use crate::scoring::memory::MemoryResponseStore;
use crate::scoring::repository::{
    Cardinality, RepositoryError, ResponseFilter, ResponseRepository, StoreSnapshot,
};
use crate::scoring::rules::RuleRegistry;
use crate::scoring::service::ScoringService;

pub(super) const COLLEGE: &str = "college-1";

pub(super) fn college() -> InstitutionId {
    InstitutionId(COLLEGE.to_string())
}

pub(super) fn session(year: i32) -> SessionYear {
    SessionYear::new(year).expect("valid session")
}

pub(super) fn submission(code: &str, session: &str, payload: MetricPayload) -> ResponseSubmission {
    ResponseSubmission {
        institution_id: COLLEGE.to_string(),
        session: session.to_string(),
        metric_code: code.to_string(),
        payload,
    }
}

pub(super) fn options(selected: u32) -> MetricPayload {
    MetricPayload::OptionCount { selected }
}

pub(super) fn ratio(numerator: f64, denominator: f64) -> MetricPayload {
    MetricPayload::Ratio {
        numerator,
        denominator,
    }
}

pub(super) fn checklist(ticked: &[&str]) -> MetricPayload {
    let items: BTreeMap<String, bool> = ticked
        .iter()
        .map(|item| (item.to_string(), true))
        .collect();
    MetricPayload::Checklist { items }
}

pub(super) fn build_service() -> (ScoringService<MemoryResponseStore>, Arc<MemoryResponseStore>) {
    let repository = Arc::new(MemoryResponseStore::new());
    let service = ScoringService::new(
        repository.clone(),
        Arc::new(MetricCatalog::standard()),
        RuleRegistry::default(),
        GradeScale::naac_default(),
    );
    (service, repository)
}

pub(super) fn service_with<R>(repository: Arc<R>, registry: RuleRegistry) -> ScoringService<R>
where
    R: ResponseRepository + 'static,
{
    ScoringService::new(
        repository,
        Arc::new(MetricCatalog::standard()),
        registry,
        GradeScale::naac_default(),
    )
}

/// Wraps the memory store and counts how often the aggregator reads it.
#[derive(Default)]
pub(super) struct CountingRepository {
    pub(super) inner: MemoryResponseStore,
    snapshots: AtomicUsize,
}

impl CountingRepository {
    pub(super) fn snapshot_reads(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }
}

impl ResponseRepository for CountingRepository {
    fn insert(
        &self,
        response: MetricResponse,
        cardinality: Cardinality,
    ) -> Result<MetricResponse, RepositoryError> {
        self.inner.insert(response, cardinality)
    }

    fn update(
        &self,
        id: ResponseId,
        expected_version: u32,
        payload: MetricPayload,
        now: DateTime<Utc>,
    ) -> Result<MetricResponse, RepositoryError> {
        self.inner.update(id, expected_version, payload, now)
    }

    fn delete(&self, id: ResponseId) -> Result<MetricResponse, RepositoryError> {
        self.inner.delete(id)
    }

    fn fetch(&self, id: ResponseId) -> Result<Option<MetricResponse>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self, filter: &ResponseFilter) -> Result<Vec<MetricResponse>, RepositoryError> {
        self.inner.list(filter)
    }

    fn snapshot(
        &self,
        institution: &InstitutionId,
        from: SessionYear,
        to: SessionYear,
    ) -> Result<StoreSnapshot, RepositoryError> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        self.inner.snapshot(institution, from, to)
    }

    fn revision(&self, institution: &InstitutionId) -> Result<u64, RepositoryError> {
        self.inner.revision(institution)
    }
}

pub(super) struct UnavailableRepository;

impl ResponseRepository for UnavailableRepository {
    fn insert(
        &self,
        _response: MetricResponse,
        _cardinality: Cardinality,
    ) -> Result<MetricResponse, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _id: ResponseId,
        _expected_version: u32,
        _payload: MetricPayload,
        _now: DateTime<Utc>,
    ) -> Result<MetricResponse, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: ResponseId) -> Result<MetricResponse, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: ResponseId) -> Result<Option<MetricResponse>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _filter: &ResponseFilter) -> Result<Vec<MetricResponse>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn snapshot(
        &self,
        _institution: &InstitutionId,
        _from: SessionYear,
        _to: SessionYear,
    ) -> Result<StoreSnapshot, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn revision(&self, _institution: &InstitutionId) -> Result<u64, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
