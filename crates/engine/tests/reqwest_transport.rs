//! The reqwest-backed transport against a local axum server.

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json, Router,
    extract::{Path, RawQuery},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde_json::{Value, json};
use verity_api::ApiClients;
use verity_engine::{ReqwestTransport, RunContext, RunOptions, parse_suite_str, run_suites};
use verity_types::{EndpointConfig, FailureKind, HarnessConfig, StepStatus};

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["phone"] == "+919876543210" {
        (StatusCode::OK, Json(json!({"data": {"token": "tok-live"}})))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "unknown phone"})))
    }
}

async fn create_catalog(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let authorized = headers.get("authorization").and_then(|value| value.to_str().ok()) == Some("Bearer tok-live");
    if !authorized {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "forbidden"})));
    }
    (
        StatusCode::CREATED,
        Json(json!({"data": {"_id": "65f0c1d2e3a4b5c6d7e8f901", "name": body["name"]}})),
    )
}

async fn fetch_catalog(Path(id): Path<String>, headers: HeaderMap, RawQuery(query): RawQuery) -> Json<Value> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string);
    Json(json!({
        "data": {"_id": id},
        "source": header("x-source"),
        "query": query,
    }))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({}))
}

async fn spawn_server() -> SocketAddr {
    let router = Router::new()
        .route("/auth/login", post(login))
        .route("/catalog", post(create_catalog))
        .route("/catalog/{id}", get(fetch_catalog))
        .route("/slow", get(slow));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let address = listener.local_addr().expect("local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    address
}

fn transport_for(base_url: String, retries: u32) -> ReqwestTransport {
    let mut endpoint = EndpointConfig::new(base_url);
    endpoint.source_tag = Some("verity-tests".into());
    endpoint.retries = retries;
    let mut config = HarnessConfig::default();
    config.endpoints.insert("default".into(), endpoint);
    ReqwestTransport::new(ApiClients::from_config(&config).expect("clients"))
}

#[tokio::test]
async fn full_suite_runs_over_http() {
    let address = spawn_server().await;
    let transport = transport_for(format!("http://{address}"), 0);
    let bundle = parse_suite_str(
        r#"
suite: catalog
steps:
  - id: login
    request:
      method: POST
      path: /auth/login
      body: { phone: "+919876543210" }
    capture:
      - { name: token, path: data.token, required: true }
  - id: create
    depends_on: [login]
    request:
      method: POST
      path: /catalog
      headers: { Authorization: "Bearer ${{ vars.token }}" }
      body: { name: "Summer" }
    expect:
      status: [200, 201]
      headers: { Content-Type: "application/json*" }
      contract:
        fields:
          - { path: data._id, format: object_id }
          - { path: data.name, equals: { value: "Summer" } }
    capture:
      - { name: catalogId, path: data._id }
  - id: fetch
    depends_on: [create]
    request:
      path: /catalog/{catalogId}
      path_params: { catalogId: "${{ vars.catalogId }}" }
      query: { tags: [summer, sale] }
    expect:
      contract:
        fields:
          - { path: data._id, equals: { value: "${{ vars.catalogId }}" } }
          - { path: source, equals: { value: "verity-tests" } }
          - { path: query, equals: { value: "tags=summer&tags=sale" } }
"#,
    )
    .expect("parse suite");
    let mut context = RunContext::new("run-http");

    let report = run_suites(&bundle.suites, &mut context, &transport, &RunOptions::default())
        .await
        .expect("plan");

    assert!(report.is_success(), "report: {report:#?}");
    assert_eq!(report.step("catalog", "create").and_then(|step| step.http_status), Some(201));
    assert_eq!(context.variables.get_str("catalogId"), Some("65f0c1d2e3a4b5c6d7e8f901"));
}

#[tokio::test]
async fn request_timeout_is_an_infrastructure_failure() {
    let address = spawn_server().await;
    let transport = transport_for(format!("http://{address}"), 0);
    let bundle = parse_suite_str(
        r#"
suite: latency
steps:
  - id: slow
    request: { path: /slow, timeout_ms: 100 }
    capture:
      - { name: never, from: status }
"#,
    )
    .expect("parse suite");
    let mut context = RunContext::default();

    let report = run_suites(&bundle.suites, &mut context, &transport, &RunOptions::default())
        .await
        .expect("plan");

    let slow = report.step("latency", "slow").expect("slow");
    assert_eq!(slow.status, StepStatus::Failed);
    assert_eq!(slow.failure, Some(FailureKind::Infrastructure));
    assert!(slow.logs.iter().any(|line| line.contains("timed out")), "logs: {:?}", slow.logs);
    assert!(!context.variables.contains("never"));
}

#[tokio::test]
async fn refused_connection_is_an_infrastructure_failure_after_retries() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let address = listener.local_addr().expect("local address");
    drop(listener);
    let transport = transport_for(format!("http://{address}"), 1);
    let bundle = parse_suite_str("suite: down\nsteps:\n  - { id: ping, request: { path: /ping } }\n").expect("parse suite");
    let mut context = RunContext::default();

    let report = run_suites(&bundle.suites, &mut context, &transport, &RunOptions::default())
        .await
        .expect("plan");

    assert_eq!(report.summary.infrastructure_failures, 1);
    assert!(report.steps[0].logs.iter().any(|line| line.contains("connection failed")));
}
