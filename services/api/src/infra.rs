use metrics_exporter_prometheus::PrometheusHandle;
use naac_score::config::ScoringConfig;
use naac_score::error::AppError;
use naac_score::scoring::ingest::ResponseImport;
use naac_score::scoring::{
    GradeBand, MemoryResponseStore, ResponseRepository, RuleRegistry, ScoringService,
    SessionYear,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Scoring service backed by the in-process response store.
pub(crate) fn build_scoring_service(
    config: &ScoringConfig,
) -> Result<ScoringService<MemoryResponseStore>, AppError> {
    let catalog = config.load_catalog()?;
    let service = ScoringService::new(
        Arc::new(MemoryResponseStore::new()),
        Arc::new(catalog),
        RuleRegistry::standard(config.window_years),
        config.grade_scale.clone(),
    )
    .with_default_target(config.default_target_grade);
    Ok(service)
}

/// Outcome of loading imported rows into a service.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct LoadReport {
    pub(crate) accepted: usize,
    pub(crate) rejected: Vec<(usize, String)>,
}

/// Submit every imported row; unreadable and rejected rows are reported with their CSV line.
pub(crate) fn load_submissions<R>(
    service: &ScoringService<R>,
    import: impl Into<ResponseImport>,
) -> LoadReport
where
    R: ResponseRepository + 'static,
{
    let ResponseImport { rows, rejected } = import.into();
    let mut report = LoadReport {
        accepted: 0,
        rejected,
    };
    for row in rows {
        match service.submit(row.submission) {
            Ok(_) => report.accepted += 1,
            Err(err) => {
                warn!(line = row.line, error = %err, "response row rejected");
                report.rejected.push((row.line, err.to_string()));
            }
        }
    }
    report.rejected.sort_by_key(|(line, _)| *line);
    report
}

pub(crate) fn parse_session(raw: &str) -> Result<SessionYear, String> {
    SessionYear::parse(raw).map_err(|err| err.to_string())
}

pub(crate) fn parse_grade(raw: &str) -> Result<GradeBand, String> {
    GradeBand::parse(raw).ok_or_else(|| format!("'{raw}' is not a NAAC grade band"))
}
