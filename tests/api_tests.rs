// tests/api_tests.rs

mod common;

use std::sync::Arc;

use circuit_tutor::{config::AppConfig, routes, state::AppState};
use common::{malformed, ScriptedGenerator};
use serde_json::{json, Value};
use tempfile::TempDir;

struct TestApp {
    address: String,
    generator: Arc<ScriptedGenerator>,
    // Artifact root lives as long as the app.
    _root: TempDir,
}

/// Spawn the app on a random port with an in-memory generator.
async fn spawn_app() -> TestApp {
    let root = TempDir::new().expect("Failed to create temp dir");

    let mut config = AppConfig::default();
    config.generator.artifact_root = root.path().join("sessions");
    config.server.static_dir = root.path().join("static");
    config.session.max_sessions = 8;

    let generator = Arc::new(ScriptedGenerator::new());
    let state = Arc::new(AppState::with_generator(config, generator.clone()));
    let app = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { address, generator, _root: root }
}

async fn create_session(client: &reqwest::Client, app: &TestApp, body: Value) -> String {
    let response = client
        .post(format!("{}/api/v1/sessions", app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 201);
    let json: Value = response.json().await.unwrap();
    json["sessionId"].as_str().unwrap().to_string()
}

fn session_url(app: &TestApp, id: &str, tail: &str) -> String {
    format!("{}/api/v1/sessions/{}/{}", app.address, id, tail)
}

#[tokio::test]
async fn health_reports_sessions() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    create_session(&client, &app, json!({})).await;

    let json: Value = client
        .get(format!("{}/api/v1/health", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["sessions"], 1);
}

#[tokio::test]
async fn create_session_uses_requested_type() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/sessions", app.address))
        .json(&json!({ "exerciseType": "AC" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["exerciseType"], "AC");
}

#[tokio::test]
async fn generate_then_grade() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &app, json!({})).await;

    let view: Value = client
        .post(session_url(&app, &id, "generate"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["exerciseType"], "DC");
    assert_eq!(view["position"], 0);
    assert_eq!(view["hasPrev"], false);
    let fields: Vec<&str> = view["answerableFields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["fieldId"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["initial", "final", "tau"]);
    // Answers are never part of the exercise view.
    assert!(!view.to_string().contains("\"final\":10"));

    let correct: Value = client
        .post(session_url(&app, &id, "answer"))
        .json(&json!({ "fieldId": "final", "value": " 10.2 " }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(correct["verdict"], "correct");
    assert_eq!(correct["feedback"], "✓ Correct!");
    assert!(correct.get("expected").is_none());

    let wrong: Value = client
        .post(session_url(&app, &id, "answer"))
        .json(&json!({ "fieldId": "final", "value": "12" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(wrong["verdict"], "incorrect");
    assert_eq!(wrong["expected"], "10.00");
    assert_eq!(wrong["feedback"], "✗ Incorrect (expected: 10.00)");
}

#[tokio::test]
async fn batch_answers_are_graded_independently() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &app, json!({})).await;
    client.post(session_url(&app, &id, "generate")).send().await.unwrap();

    let results: Vec<Value> = client
        .post(session_url(&app, &id, "answers"))
        .json(&json!({ "answers": [
            { "fieldId": "tau", "value": "0.5" },
            { "fieldId": "initial", "value": "abc" },
            { "fieldId": "omega", "value": "1" }
        ]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let verdicts: Vec<&str> = results.iter().map(|r| r["verdict"].as_str().unwrap()).collect();
    assert_eq!(verdicts, ["correct", "unparseable", "no_solution"]);
}

#[tokio::test]
async fn navigation_and_at_start_conflict() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &app, json!({})).await;

    let first: Value = client.post(session_url(&app, &id, "generate")).send().await.unwrap().json().await.unwrap();

    let response = client.post(session_url(&app, &id, "back")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 409);
    let err: Value = response.json().await.unwrap();
    assert_eq!(err["error"], "at_start");

    let second: Value = client.post(session_url(&app, &id, "next")).send().await.unwrap().json().await.unwrap();
    assert_eq!(second["position"], 1);
    assert_ne!(second["exerciseId"], first["exerciseId"]);

    let back: Value = client.post(session_url(&app, &id, "back")).send().await.unwrap().json().await.unwrap();
    assert_eq!(back["exerciseId"], first["exerciseId"]);
    assert_eq!(back["createdAt"], first["createdAt"]);
    assert!(chrono::DateTime::parse_from_rfc3339(back["createdAt"].as_str().unwrap()).is_ok());
    assert_eq!(back["hasNext"], true);

    let current: Value = client.get(session_url(&app, &id, "current")).send().await.unwrap().json().await.unwrap();
    assert_eq!(current["exerciseId"], first["exerciseId"]);
    assert_eq!(app.generator.calls(), 2);
}

#[tokio::test]
async fn switch_type_resets_history() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &app, json!({})).await;
    client.post(session_url(&app, &id, "generate")).send().await.unwrap();
    client.post(session_url(&app, &id, "next")).send().await.unwrap();

    let view: Value = client
        .post(session_url(&app, &id, "type"))
        .json(&json!({ "exerciseType": "AC" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["exerciseType"], "AC");
    assert_eq!(view["total"], 1);
    assert_eq!(view["hasPrev"], false);
    assert!(view["questionText"].as_str().unwrap().starts_with("AC circuit with i_s(t) = 2*sin(314t) A."));
}

#[tokio::test]
async fn diagram_is_served_per_exercise() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &app, json!({})).await;
    let view: Value = client.post(session_url(&app, &id, "generate")).send().await.unwrap().json().await.unwrap();
    client.post(session_url(&app, &id, "next")).send().await.unwrap();

    let response = client
        .get(format!("{}{}", app.address, view["diagramRef"].as_str().unwrap()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()["content-type"], "image/svg+xml");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"<svg id=\"0\"/>");

    let missing = client
        .get(session_url(&app, &id, &format!("exercises/{}/diagram", uuid::Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);
}

#[tokio::test]
async fn invalid_type_is_bad_request() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &app, json!({})).await;

    let response = client.post(session_url(&app, &id, "generate?type=RF")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let err: Value = response.json().await.unwrap();
    assert_eq!(err["error"], "invalid_exercise_type");
    assert_eq!(app.generator.calls(), 0);
}

#[tokio::test]
async fn generator_failure_is_bad_gateway_and_keeps_state() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &app, json!({})).await;
    let first: Value = client.post(session_url(&app, &id, "generate")).send().await.unwrap().json().await.unwrap();

    app.generator.fail_next(malformed());
    let response = client.post(session_url(&app, &id, "next")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 502);
    let err: Value = response.json().await.unwrap();
    assert_eq!(err["error"], "malformed_output");

    let current: Value = client.get(session_url(&app, &id, "current")).send().await.unwrap().json().await.unwrap();
    assert_eq!(current["exerciseId"], first["exerciseId"]);
}

#[tokio::test]
async fn empty_session_has_no_current() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let id = create_session(&client, &app, json!({})).await;

    let response = client.get(session_url(&app, &id, "current")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let err: Value = response.json().await.unwrap();
    assert_eq!(err["error"], "no_current");

    let response = client
        .post(session_url(&app, &id, "answer"))
        .json(&json!({ "fieldId": "tau", "value": "1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn unknown_and_deleted_sessions_are_not_found() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(session_url(&app, &uuid::Uuid::new_v4().to_string(), "current"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let err: Value = response.json().await.unwrap();
    assert_eq!(err["error"], "unknown_session");

    let id = create_session(&client, &app, json!({})).await;
    let response = client
        .delete(format!("{}/api/v1/sessions/{}", app.address, id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = client.post(session_url(&app, &id, "generate")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn websocket_rejects_unknown_type() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/ws?type=RF", app.address))
        .header("Connection", "upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let err: Value = response.json().await.unwrap();
    assert_eq!(err["error"], "invalid_exercise_type");
}

#[tokio::test]
async fn oldest_session_is_evicted_past_the_limit() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let oldest = create_session(&client, &app, json!({})).await;
    client.post(session_url(&app, &oldest, "generate")).send().await.unwrap();
    let mut newest = String::new();
    for _ in 0..8 {
        newest = create_session(&client, &app, json!({})).await;
    }

    let response = client.get(session_url(&app, &oldest, "current")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let err: Value = response.json().await.unwrap();
    assert_eq!(err["error"], "unknown_session");

    let response = client.post(session_url(&app, &newest, "generate")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let health: Value = client
        .get(format!("{}/api/v1/health", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["sessions"], 8);
}
