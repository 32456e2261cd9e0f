use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use caseserver::config::AppConfig;
use caseserver::shared::AppState;
use caseserver::{catalog, conversion, deals, leads, projects};

fn app() -> Router {
    let state = Arc::new(AppState::new(AppConfig::default()));
    Router::new()
        .merge(leads::configure())
        .merge(deals::configure())
        .merge(projects::configure())
        .merge(conversion::configure())
        .route("/api/crm/stages", get(catalog::stage_catalogs))
        .with_state(state)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn lead_converts_over_http() {
    let app = app();
    let (status, lead) = send(
        &app,
        "POST",
        "/api/crm/leads",
        Some(serde_json::json!({
            "name": "Farah Osman",
            "email": "farah@example.com",
            "case_type": "study_visa"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lead["stage"], "first_contact");
    let id = lead["id"].as_str().unwrap().to_string();

    let advance_uri = format!("/api/crm/leads/{id}/advance");
    send(&app, "POST", &advance_uri, None).await;
    send(&app, "POST", &advance_uri, None).await;
    let (status, outcome) = send(&app, "POST", &advance_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["lead"]["stage"], "convert_to_opportunity");
    assert_eq!(outcome["deal_created"], true);
    assert_eq!(outcome["deal"]["pipeline_stage"], "opportunity");
}

#[tokio::test]
async fn missing_entities_return_404_with_error_body() {
    let app = app();
    let uri = format!("/api/crm/leads/{}", Uuid::new_v4());
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().starts_with("Not found"));
}

#[tokio::test]
async fn unconfirmed_won_is_rejected_with_400() {
    let app = app();
    let (_, deal) = send(
        &app,
        "POST",
        "/api/crm/deals",
        Some(serde_json::json!({
            "client_name": "HTTP Deal",
            "case_type": "work_permit"
        })),
    )
    .await;
    let id = deal["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/crm/deals/{id}/won"),
        Some(serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("confirmation"));

    let (status, outcome) = send(
        &app,
        "POST",
        &format!("/api/crm/deals/{id}/won"),
        Some(serde_json::json!({"confirmed": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["project_created"], true);
}

#[tokio::test]
async fn partial_batch_delete_returns_207_with_counts() {
    let app = app();
    let (_, lead) = send(
        &app,
        "POST",
        "/api/crm/leads",
        Some(serde_json::json!({"name": "Dup", "case_type": "visitor_visa"})),
    )
    .await;
    let id = lead["id"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/api/crm/leads/batch-delete",
        Some(serde_json::json!({"ids": [id, Uuid::new_v4()]})),
    )
    .await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    assert_eq!(body["total"], 2);
    assert_eq!(body["failed"], 1);
    assert_eq!(body["succeeded"], 1);
}

#[tokio::test]
async fn stage_catalogs_expose_all_three_pipelines() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/crm/stages", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lead_stages"].as_array().unwrap().len(), 4);
    assert_eq!(body["deal_stages"].as_array().unwrap().len(), 14);
    assert_eq!(body["case_stages"].as_array().unwrap().len(), 6);
    assert_eq!(body["case_stages"][5]["progress_pct"], 100);
}
