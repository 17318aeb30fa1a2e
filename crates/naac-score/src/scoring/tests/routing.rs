use super::common::*;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::scoring::router::scoring_router;
use crate::scoring::rules::RuleRegistry;

fn app() -> Router {
    let (service, _) = build_service();
    scoring_router(Arc::new(service))
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn energy_submission(selected: u32) -> Value {
    json!({
        "institution_id": COLLEGE,
        "session": "2024-25",
        "metric_code": "7.1.2",
        "payload": { "type": "option_count", "selected": selected },
    })
}

async fn submit(app: &Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/responses", body))
        .await
        .expect("router responds");
    let status = response.status();
    (status, read_json_body(response).await)
}

#[tokio::test]
async fn submit_returns_created_row() {
    let app = app();
    let (status, body) = submit(&app, energy_submission(3)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["metric_code"], "7.1.2");
    assert_eq!(body["session_year"], 2024);
    assert_eq!(body["version"], 1);
    assert_eq!(body["payload"]["selected"], 3);
}

#[tokio::test]
async fn submit_rejects_invalid_payloads_with_field() {
    let app = app();
    let (status, body) = submit(
        &app,
        json!({
            "institution_id": COLLEGE,
            "session": "2024",
            "metric_code": "2.1.1",
            "payload": { "type": "ratio", "numerator": 10.0, "denominator": 0.0 },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["field"], "payload.denominator");

    let (status, _) = submit(
        &app,
        json!({
            "institution_id": COLLEGE,
            "session": "1800",
            "metric_code": "7.1.2",
            "payload": { "type": "option_count", "selected": 1 },
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn duplicate_single_valued_submission_conflicts() {
    let app = app();
    let (first, _) = submit(&app, energy_submission(2)).await;
    assert_eq!(first, StatusCode::CREATED);

    let (second, body) = submit(&app, energy_submission(4)).await;
    assert_eq!(second, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap_or_default().contains("7.1.2"));
}

#[tokio::test]
async fn response_lifecycle_over_http() {
    let app = app();
    let (_, created) = submit(&app, energy_submission(1)).await;
    let id = created["id"].as_u64().expect("numeric id");

    let fetched = app
        .clone()
        .oneshot(get(&format!("/api/v1/responses/resp-{id:06}")))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);

    let updated = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/responses/{id}"),
            json!({
                "expected_version": 1,
                "payload": { "type": "option_count", "selected": 4 },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(read_json_body(updated).await["version"], 2);

    let stale = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            &format!("/api/v1/responses/{id}"),
            json!({
                "expected_version": 1,
                "payload": { "type": "option_count", "selected": 0 },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(stale.status(), StatusCode::CONFLICT);

    let listed = app
        .clone()
        .oneshot(get(&format!(
            "/api/v1/responses?institution={COLLEGE}&metric=7.1.2"
        )))
        .await
        .unwrap();
    let rows = read_json_body(listed).await;
    assert_eq!(rows.as_array().map(Vec::len), Some(1));

    let deleted = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/v1/responses/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = app
        .clone()
        .oneshot(get(&format!("/api/v1/responses/{id}")))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metric_score_reports_ancestor_scores() {
    let app = app();
    submit(&app, energy_submission(3)).await;

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/score/7.1.2?institution={COLLEGE}&session=2024-25"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    assert_eq!(body["score_sub_sub_criteria"], 75.0);
    assert_eq!(body["score_sub_criteria"], body["score_criteria"]);
    assert!(body["score_overall"].as_f64().unwrap() < 75.0);
    assert_eq!(body["status"], "scored");
    assert_eq!(body["partial"], false);
    assert!(body.get("computed_at").is_some());
}

#[tokio::test]
async fn metric_score_without_rows_is_no_data() {
    let response = app()
        .oneshot(get(&format!("/score/7.1.2?institution={COLLEGE}&session=2024")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    assert_eq!(
        body,
        json!({ "status": "no_data", "message": "No score data available" })
    );
}

#[tokio::test]
async fn summary_uses_requested_target_grade() {
    let app = app();
    submit(&app, energy_submission(4)).await;

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/score/summary?institution={COLLEGE}&session=2024&target_grade=b%2B"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    assert_eq!(body["target_grade"], "B+");
    assert_eq!(body["target"], 62.75);
    assert_eq!(body["criteria"].as_array().map(Vec::len), Some(7));
    assert_eq!(body["status_label"], "Below Target");

    let bad = app
        .clone()
        .oneshot(get(&format!(
            "/score/summary?institution={COLLEGE}&session=2024&target_grade=Z"
        )))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json_body(bad).await["field"], "target_grade");
}

#[tokio::test]
async fn malformed_queries_are_bad_requests() {
    let app = app();
    let response = app
        .clone()
        .oneshot(get(&format!("/score/7.1.2?institution={COLLEGE}&session=twenty")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json_body(response).await["field"], "session");

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/v1/scores/branch/7.1?institution={COLLEGE}&session=2024"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_query_parameters_name_the_field() {
    let app = app();
    for (uri, field) in [
        ("/score/summary?session=2024".to_string(), "institution"),
        (format!("/score/7.1.2?institution={COLLEGE}"), "session"),
        ("/api/v1/scores/criterion/7".to_string(), "institution"),
    ] {
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body = read_json_body(response).await;
        assert_eq!(body["field"], field, "{uri}");
        assert!(body["error"].as_str().is_some(), "{uri}");
    }
}

#[tokio::test]
async fn unknown_nodes_are_not_found() {
    let app = app();
    let response = app
        .clone()
        .oneshot(get(&format!("/score/9.9.9?institution={COLLEGE}&session=2024")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/v1/scores/sub_criterion/3.3?institution={COLLEGE}&session=2024"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn node_scores_are_served_by_level() {
    let app = app();
    submit(&app, energy_submission(3)).await;

    let response = app
        .clone()
        .oneshot(get(&format!(
            "/api/v1/scores/criterion/7?institution={COLLEGE}&session=2024"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    assert_eq!(body["level"], "criterion");
    assert_eq!(body["key"], "7");
    assert_eq!(body["session_year"], 2024);
}

#[tokio::test]
async fn catalog_lists_metrics_and_scale() {
    let response = app().oneshot(get("/api/v1/catalog")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    assert_eq!(body["criteria"].as_array().map(Vec::len), Some(7));
    assert_eq!(body["default_target_grade"], "A");
    assert_eq!(body["grade_scale"][0]["band"], "A++");
}

#[tokio::test]
async fn repository_outage_is_internal_error() {
    let service = service_with(Arc::new(UnavailableRepository), RuleRegistry::default());
    let app = scoring_router(Arc::new(service));

    let response = app
        .oneshot(get(&format!("/score/summary?institution={COLLEGE}&session=2024")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
