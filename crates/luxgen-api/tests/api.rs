//! End-to-end tests over the HTTP router

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use luxgen_api::{build_router, AppState, PlatformConfig};
use serde_json::{json, Value};
use std::time::Duration;

const TENANT_HEADER: HeaderName = HeaderName::from_static("x-tenant-id");

fn server() -> (TestServer, AppState) {
    let state = AppState::from_config(PlatformConfig::default()).unwrap();
    let server = TestServer::new(build_router(state.clone())).unwrap();
    (server, state)
}

fn host(value: &'static str) -> (HeaderName, HeaderValue) {
    (header::HOST, HeaderValue::from_static(value))
}

fn tenant(slug: &'static str) -> (HeaderName, HeaderValue) {
    (TENANT_HEADER, HeaderValue::from_static(slug))
}

fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token)).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (server, _) = server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["activeExecutions"], 0);
}

#[tokio::test]
async fn test_subdomain_resolution_grants_enterprise_features() {
    let (server, _) = server();
    let (name, value) = host("acme.luxgen.example");

    let response = server.get("/api/v1/tenant").add_header(name.clone(), value.clone()).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["slug"], "acme");
    assert_eq!(body["data"]["identifiedBy"], "subdomain");
    assert_eq!(body["data"]["tier"], "enterprise");

    let response = server
        .get("/api/v1/tenant/features/anything_at_all")
        .add_header(name, value)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["enabled"], true);
}

#[tokio::test]
async fn test_header_resolution_on_localhost() {
    let (server, _) = server();
    let (host_name, host_value) = host("localhost:8080");
    let (name, value) = tenant("demo-tenant");

    let response = server
        .get("/api/v1/tenant")
        .add_header(host_name, host_value)
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["id"], "demo-tenant");
    assert_eq!(body["data"]["identifiedBy"], "header");
}

#[tokio::test]
async fn test_unknown_tenant_is_404_envelope() {
    let (server, _) = server();
    let (name, value) = tenant("nobody");

    let response = server.get("/api/v1/tenant").add_header(name, value).await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "TENANT_NOT_FOUND");
    assert_eq!(body["statusCode"], 404);
}

#[tokio::test]
async fn test_feature_outside_tier_is_forbidden() {
    let (server, _) = server();
    let (name, value) = tenant("demo-tenant");

    let response = server.get("/api/v1/tenant/features/sso").add_header(name, value).await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["error"]["code"], "FEATURE_NOT_AVAILABLE");
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let (server, _) = server();
    let (name, value) = tenant("acme");
    let (auth_name, auth_value) = bearer("not-a-jwt");

    let response = server
        .get("/api/v1/tenant")
        .add_header(name, value)
        .add_header(auth_name, auth_value)
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_token_claim_identifies_tenant() {
    let (server, state) = server();
    let token = state.auth.issue("user-7", Some("luxgen"), Some("admin")).unwrap();
    let (auth_name, auth_value) = bearer(&token);

    let response = server.get("/api/v1/tenant").add_header(auth_name, auth_value).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["slug"], "luxgen");
    assert_eq!(body["data"]["identifiedBy"], "claim");
}

#[tokio::test]
async fn test_workflow_listing() {
    let (server, _) = server();
    let (name, value) = tenant("acme");

    let response = server.get("/api/v1/workflows").add_header(name, value).await;

    response.assert_status_ok();
    let ids: Vec<String> = response.json::<Value>()["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["feed-publishing", "job-post-management", "user-creation"]);
}

#[tokio::test]
async fn test_workflow_docs() {
    let (server, _) = server();
    let (name, value) = tenant("acme");

    let response = server
        .get("/api/v1/workflows/job-post-management/docs")
        .add_header(name, value)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["executionOrder"][0], json!(["validate-job"]));
}

#[tokio::test]
async fn test_job_post_execution() {
    let (server, _) = server();
    let (name, value) = tenant("luxgen");

    let response = server
        .post("/api/v1/workflows/job-post-management/execute")
        .add_header(name, value)
        .json(&json!({ "title": "Rust Engineer", "description": "Build things" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["workflowId"], "job-post-management");
    assert!(body["data"]["jobId"].as_str().unwrap().starts_with("job_"));
    assert!(body["executionId"].as_str().is_some());
}

#[tokio::test]
async fn test_token_cannot_cross_into_another_tenant() {
    let (server, state) = server();
    let token = state.auth.issue("acme-user", Some("acme"), Some("admin")).unwrap();
    let (auth_name, auth_value) = bearer(&token);
    let (host_name, host_value) = host("localhost");
    let (name, value) = tenant("demo-tenant");

    let response = server
        .post("/api/v1/workflows/job-post-management/execute")
        .add_header(host_name, host_value)
        .add_header(name, value)
        .add_header(auth_name, auth_value)
        .json(&json!({ "title": "Rust Engineer", "description": "Build things" }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["error"]["code"], "TENANT_MISMATCH");
    let demo = luxgen_tenant::TenantId::new("demo-tenant");
    assert!(state.isolation.cached_handle(&demo).is_none());
    assert_eq!(state.engine.statistics(None).total, 0);
}

#[tokio::test]
async fn test_validation_failure_uses_step_status() {
    let (server, _) = server();
    let (name, value) = tenant("luxgen");

    let response = server
        .post("/api/v1/workflows/job-post-management/execute")
        .add_header(name, value)
        .json(&json!({ "title": "" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["errors"][0]["stepId"], "validate-job");
}

#[tokio::test]
async fn test_invalid_body_is_bad_request() {
    let (server, _) = server();
    let (name, value) = tenant("luxgen");

    let response = server
        .post("/api/v1/workflows/job-post-management/execute")
        .add_header(name, value)
        .add_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .bytes("{not json".into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_unknown_workflow_is_404() {
    let (server, _) = server();
    let (name, value) = tenant("luxgen");

    let response = server
        .post("/api/v1/workflows/does-not-exist/execute")
        .add_header(name, value)
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "WORKFLOW_NOT_FOUND");
}

#[tokio::test]
async fn test_async_execution_then_status() {
    let (server, _) = server();
    let (name, value) = tenant("acme");

    let response = server
        .post("/api/v1/workflows/job-post-management/execute")
        .add_query_param("mode", "async")
        .add_header(name.clone(), value.clone())
        .json(&json!({ "title": "Designer", "description": "Draw things" }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["data"]["status"], "pending");
    let execution_id = body["data"]["executionId"].as_str().unwrap().to_string();

    let mut status = Value::Null;
    for _ in 0..100 {
        let response = server
            .get(&format!("/api/v1/executions/{}", execution_id))
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status_ok();
        status = response.json::<Value>()["data"]["status"].clone();
        if status == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, "completed");
}

#[tokio::test]
async fn test_foreign_execution_is_hidden() {
    let (server, _) = server();
    let (acme, acme_value) = tenant("acme");
    let (luxgen, luxgen_value) = tenant("luxgen");

    let response = server
        .post("/api/v1/workflows/job-post-management/execute")
        .add_header(acme, acme_value)
        .json(&json!({ "title": "Ops", "description": "Keep things running" }))
        .await;
    response.assert_status_ok();
    let execution_id = response.json::<Value>()["executionId"].as_str().unwrap().to_string();

    let response = server
        .get(&format!("/api/v1/executions/{}", execution_id))
        .add_header(luxgen.clone(), luxgen_value.clone())
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"]["code"], "EXECUTION_NOT_FOUND");

    let response = server
        .post(&format!("/api/v1/executions/{}/cancel", execution_id))
        .add_header(luxgen, luxgen_value)
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_scoped_to_tenant() {
    let (server, state) = server();
    let (acme, acme_value) = tenant("acme");

    server
        .post("/api/v1/workflows/job-post-management/execute")
        .add_header(acme.clone(), acme_value.clone())
        .json(&json!({ "title": "QA", "description": "Test things" }))
        .await
        .assert_status_ok();

    let response = server.get("/api/v1/stats").add_header(acme.clone(), acme_value.clone()).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["passed"], 1);

    let (demo, demo_value) = tenant("demo-tenant");
    let response = server.get("/api/v1/stats").add_header(demo, demo_value).await;
    assert_eq!(response.json::<Value>()["data"]["total"], 0);

    let response = server
        .get("/api/v1/stats")
        .add_query_param("scope", "global")
        .add_header(acme.clone(), acme_value.clone())
        .await;
    response.assert_status(StatusCode::FORBIDDEN);

    let token = state.auth.issue("root", None, Some("super_admin")).unwrap();
    let (auth_name, auth_value) = bearer(&token);
    let response = server
        .get("/api/v1/stats")
        .add_query_param("scope", "global")
        .add_header(acme, acme_value)
        .add_header(auth_name, auth_value)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["total"], 1);
}
