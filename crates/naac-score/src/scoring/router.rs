use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::aggregate::ScoreLevel;
use super::catalog::{GroupDefinition, MetricDefinition};
use super::domain::{
    InstitutionId, MetricCode, ResponseId, ResponseSubmission, ResponseUpdate, SessionYear,
};
use super::grade::{GradeBand, GradeThreshold};
use super::repository::{RepositoryError, ResponseFilter, ResponseRepository};
use super::service::{ScoreLookup, ScoringService, ScoringServiceError};

/// Router exposing response CRUD and score queries.
pub fn scoring_router<R>(service: Arc<ScoringService<R>>) -> Router
where
    R: ResponseRepository + 'static,
{
    Router::new()
        .route("/api/v1/catalog", get(catalog_handler::<R>))
        .route(
            "/api/v1/responses",
            get(list_handler::<R>).post(submit_handler::<R>),
        )
        .route(
            "/api/v1/responses/:response_id",
            get(fetch_handler::<R>)
                .put(update_handler::<R>)
                .delete(delete_handler::<R>),
        )
        .route("/api/v1/scores/:level/:key", get(node_score_handler::<R>))
        .route("/score/summary", get(summary_handler::<R>))
        .route("/score/:metric_code", get(metric_score_handler::<R>))
        .with_state(service)
}

#[derive(Debug, Serialize)]
struct CatalogView<'a> {
    criteria: Vec<&'a GroupDefinition>,
    sub_criteria: Vec<&'a GroupDefinition>,
    metrics: Vec<&'a MetricDefinition>,
    grade_scale: &'a [GradeThreshold],
    default_target_grade: GradeBand,
}

pub(crate) async fn catalog_handler<R>(State(service): State<Arc<ScoringService<R>>>) -> Response
where
    R: ResponseRepository + 'static,
{
    let catalog = service.catalog();
    let view = CatalogView {
        criteria: catalog.criteria().collect(),
        sub_criteria: catalog
            .groups()
            .filter(|group| !group.key.is_criterion())
            .collect(),
        metrics: catalog.metrics().collect(),
        grade_scale: service.scale().thresholds(),
        default_target_grade: service.default_target(),
    };
    (StatusCode::OK, axum::Json(view)).into_response()
}

pub(crate) async fn submit_handler<R>(
    State(service): State<Arc<ScoringService<R>>>,
    axum::Json(submission): axum::Json<ResponseSubmission>,
) -> Response
where
    R: ResponseRepository + 'static,
{
    match service.submit(submission) {
        Ok(stored) => (StatusCode::CREATED, axum::Json(stored)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    institution: Option<String>,
    session: Option<String>,
    metric: Option<String>,
}

pub(crate) async fn list_handler<R>(
    State(service): State<Arc<ScoringService<R>>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: ResponseRepository + 'static,
{
    let session = match query.session.as_deref().map(SessionYear::parse).transpose() {
        Ok(session) => session,
        Err(err) => return bad_request("session", err.to_string()),
    };
    let metric = match query.metric.as_deref().map(MetricCode::parse).transpose() {
        Ok(metric) => metric,
        Err(err) => return bad_request("metric", err.to_string()),
    };
    let filter = ResponseFilter {
        institution: query.institution.map(InstitutionId),
        session,
        metric,
    };

    match service.list_responses(&filter) {
        Ok(rows) => (StatusCode::OK, axum::Json(rows)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn fetch_handler<R>(
    State(service): State<Arc<ScoringService<R>>>,
    Path(response_id): Path<String>,
) -> Response
where
    R: ResponseRepository + 'static,
{
    let Some(id) = parse_response_id(&response_id) else {
        return not_found(&response_id);
    };
    match service.get_response(id) {
        Ok(row) => (StatusCode::OK, axum::Json(row)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_handler<R>(
    State(service): State<Arc<ScoringService<R>>>,
    Path(response_id): Path<String>,
    axum::Json(update): axum::Json<ResponseUpdate>,
) -> Response
where
    R: ResponseRepository + 'static,
{
    let Some(id) = parse_response_id(&response_id) else {
        return not_found(&response_id);
    };
    match service.update(id, update) {
        Ok(row) => (StatusCode::OK, axum::Json(row)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn delete_handler<R>(
    State(service): State<Arc<ScoringService<R>>>,
    Path(response_id): Path<String>,
) -> Response
where
    R: ResponseRepository + 'static,
{
    let Some(id) = parse_response_id(&response_id) else {
        return not_found(&response_id);
    };
    match service.delete(id) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ScoreQuery {
    institution: Option<String>,
    session: Option<String>,
    target_grade: Option<String>,
}

impl ScoreQuery {
    fn resolve(&self) -> Result<(InstitutionId, SessionYear), Response> {
        let institution = self.institution.as_deref().map(str::trim).unwrap_or_default();
        if institution.is_empty() {
            return Err(bad_request("institution", "institution is required"));
        }
        let Some(session) = self.session.as_deref().filter(|raw| !raw.trim().is_empty()) else {
            return Err(bad_request("session", "session is required"));
        };
        let session =
            SessionYear::parse(session).map_err(|err| bad_request("session", err.to_string()))?;
        Ok((InstitutionId(institution.to_string()), session))
    }
}

pub(crate) async fn metric_score_handler<R>(
    State(service): State<Arc<ScoringService<R>>>,
    Path(metric_code): Path<String>,
    Query(query): Query<ScoreQuery>,
) -> Response
where
    R: ResponseRepository + 'static,
{
    let (institution, session) = match query.resolve() {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };
    let code = match MetricCode::parse(&metric_code) {
        Ok(code) => code,
        Err(_) => return not_found(&metric_code),
    };

    lookup_response(service.metric_score(&institution, session, &code))
}

pub(crate) async fn summary_handler<R>(
    State(service): State<Arc<ScoringService<R>>>,
    Query(query): Query<ScoreQuery>,
) -> Response
where
    R: ResponseRepository + 'static,
{
    let (institution, session) = match query.resolve() {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };
    let target_grade = match query.target_grade.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match GradeBand::parse(raw) {
            Some(band) => Some(band),
            None => {
                return bad_request("target_grade", format!("unknown grade band '{raw}'"));
            }
        },
    };

    lookup_response(service.summary(&institution, session, target_grade))
}

pub(crate) async fn node_score_handler<R>(
    State(service): State<Arc<ScoringService<R>>>,
    Path((level, key)): Path<(String, String)>,
    Query(query): Query<ScoreQuery>,
) -> Response
where
    R: ResponseRepository + 'static,
{
    let (institution, session) = match query.resolve() {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };
    let Some(level) = ScoreLevel::parse(&level) else {
        return bad_request("level", format!("unknown score level '{level}'"));
    };

    lookup_response(service.get_score(&institution, session, level, &key))
}

fn lookup_response<T: Serialize>(
    result: Result<ScoreLookup<T>, ScoringServiceError>,
) -> Response {
    match result {
        Ok(ScoreLookup::Found(view)) => (StatusCode::OK, axum::Json(view)).into_response(),
        Ok(ScoreLookup::NoData) => {
            let payload = json!({
                "status": "no_data",
                "message": "No score data available",
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

fn parse_response_id(raw: &str) -> Option<ResponseId> {
    let digits = raw.trim().trim_start_matches("resp-");
    digits.parse::<u64>().ok().map(ResponseId)
}

fn bad_request(field: &str, message: impl Into<String>) -> Response {
    let payload = json!({
        "error": message.into(),
        "field": field,
    });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}

fn not_found(key: &str) -> Response {
    let payload = json!({
        "error": format!("'{key}' not found"),
    });
    (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
}

fn error_response(err: ScoringServiceError) -> Response {
    match err {
        ScoringServiceError::Validation(error) => {
            let payload = json!({
                "error": error.to_string(),
                "field": error.field(),
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        ScoringServiceError::Repository(
            error @ (RepositoryError::Conflict { .. } | RepositoryError::VersionMismatch { .. }),
        ) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        ScoringServiceError::Repository(RepositoryError::NotFound) => {
            let payload = json!({
                "error": "response not found",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        error @ ScoringServiceError::UnknownNode { .. } => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        other => {
            tracing::error!(error = %other, "scoring request failed");
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
