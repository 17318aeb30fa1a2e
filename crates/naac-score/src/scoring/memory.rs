use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{InstitutionId, MetricPayload, MetricResponse, ResponseId, SessionYear};
use super::repository::{
    Cardinality, RepositoryError, ResponseFilter, ResponseRepository, StoreSnapshot,
};

#[derive(Debug, Default)]
struct StoreState {
    next_id: u64,
    responses: BTreeMap<ResponseId, MetricResponse>,
    revisions: HashMap<InstitutionId, u64>,
}

impl StoreState {
    fn bump(&mut self, institution: &InstitutionId) {
        *self.revisions.entry(institution.clone()).or_insert(0) += 1;
    }
}

/// Process-local response store. Check-and-insert happens under one lock.
#[derive(Debug, Default, Clone)]
pub struct MemoryResponseStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("response store lock poisoned".to_string()))
    }
}

impl ResponseRepository for MemoryResponseStore {
    fn insert(
        &self,
        mut response: MetricResponse,
        cardinality: Cardinality,
    ) -> Result<MetricResponse, RepositoryError> {
        let mut state = self.lock()?;

        if cardinality == Cardinality::Single
            && state.responses.values().any(|existing| {
                existing.institution_id == response.institution_id
                    && existing.session_year == response.session_year
                    && existing.metric_code == response.metric_code
            })
        {
            return Err(RepositoryError::Conflict {
                metric: response.metric_code.to_string(),
                session: response.session_year,
            });
        }

        state.next_id += 1;
        response.id = ResponseId(state.next_id);
        state.responses.insert(response.id, response.clone());
        state.bump(&response.institution_id);
        Ok(response)
    }

    fn update(
        &self,
        id: ResponseId,
        expected_version: u32,
        payload: MetricPayload,
        now: DateTime<Utc>,
    ) -> Result<MetricResponse, RepositoryError> {
        let mut state = self.lock()?;
        let stored = state
            .responses
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;

        if stored.version != expected_version {
            return Err(RepositoryError::VersionMismatch {
                expected: expected_version,
                found: stored.version,
            });
        }

        stored.payload = payload;
        stored.version += 1;
        // Watermarks must move forward even if the wall clock does not.
        stored.updated_at = now.max(stored.updated_at);
        let updated = stored.clone();
        state.bump(&updated.institution_id);
        Ok(updated)
    }

    fn delete(&self, id: ResponseId) -> Result<MetricResponse, RepositoryError> {
        let mut state = self.lock()?;
        let removed = state.responses.remove(&id).ok_or(RepositoryError::NotFound)?;
        state.bump(&removed.institution_id);
        Ok(removed)
    }

    fn fetch(&self, id: ResponseId) -> Result<Option<MetricResponse>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.responses.get(&id).cloned())
    }

    fn list(&self, filter: &ResponseFilter) -> Result<Vec<MetricResponse>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .responses
            .values()
            .filter(|response| filter.matches(response))
            .cloned()
            .collect())
    }

    fn snapshot(
        &self,
        institution: &InstitutionId,
        from: SessionYear,
        to: SessionYear,
    ) -> Result<StoreSnapshot, RepositoryError> {
        let state = self.lock()?;
        let responses = state
            .responses
            .values()
            .filter(|response| {
                response.institution_id == *institution
                    && response.session_year >= from
                    && response.session_year <= to
            })
            .cloned()
            .collect();
        Ok(StoreSnapshot {
            revision: state.revisions.get(institution).copied().unwrap_or(0),
            responses,
        })
    }

    fn revision(&self, institution: &InstitutionId) -> Result<u64, RepositoryError> {
        let state = self.lock()?;
        Ok(state.revisions.get(institution).copied().unwrap_or(0))
    }
}
