use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use tts_api_server::{
    build_state, config::Config, create_app, handlers::AppState,
    middleware::auth::StaticTokenVerifier,
};

const TOKEN_A: &str = "token-a";
const TOKEN_B: &str = "token-b";

struct TestApp {
    state: AppState,
    vendor: MockServer,
    _dir: TempDir,
}

async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

async fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let dir = TempDir::new().expect("tempdir");
    let vendor = MockServer::start().await;

    let mut config = Config {
        database_url: format!("sqlite://{}/test.db", dir.path().display()),
        redis_url: None,
        port: 0,
        identity_userinfo_url: "http://identity.invalid/me".to_string(),
        openai_api_key: Some("test-openai-key".to_string()),
        openai_base_url: format!("{}/openai/audio/speech", vendor.uri()),
        siliconflow_api_key: Some("test-sf-key".to_string()),
        siliconflow_base_url: format!("{}/sf/audio/speech", vendor.uri()),
        provider_timeout_secs: 5,
        audio_storage_dir: Some(dir.path().join("audio").display().to_string()),
        audio_public_base_url: "/files".to_string(),
        audio_cache_ttl_secs: 60,
        rate_limit_requests: 1000,
        rate_limit_window_secs: 60,
    };
    tweak(&mut config);

    let verifier = Arc::new(
        StaticTokenVerifier::new()
            .with_token(TOKEN_A, "user-a", "a@example.com")
            .with_token(TOKEN_B, "user-b", "b@example.com"),
    );

    let state = build_state(config, verifier).await.expect("build state");
    TestApp {
        state,
        vendor,
        _dir: dir,
    }
}

async fn mount_vendor_success(vendor: &MockServer, route: &str, bytes: &'static [u8]) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
        .mount(vendor)
        .await;
}

async fn send(
    state: &AppState,
    method_name: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>, Option<String>) {
    let mut builder = Request::builder().method(method_name).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = create_app(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec(), content_type)
}

async fn send_json(
    state: &AppState,
    method_name: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, bytes, _) = send(state, method_name, uri, token, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Provisions the user row by hitting an authenticated endpoint once.
async fn provision_user(state: &AppState, token: &str) {
    let (status, _) = send_json(state, "GET", "/api/user/quota", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
}

async fn set_quota_used(state: &AppState, external_id: &str, used: i64) {
    sqlx::query("UPDATE users SET quota_used = ? WHERE external_id = ?")
        .bind(used)
        .bind(external_id)
        .execute(state.database.pool())
        .await
        .unwrap();
}

async fn job_count(state: &AppState) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tts_jobs")
        .fetch_one(state.database.pool())
        .await
        .unwrap()
}

async fn poll_until_terminal(state: &AppState, token: &str, job_id: &str) -> Value {
    for _ in 0..250 {
        let (status, body) = send_json(
            state,
            "GET",
            &format!("/api/tts/status/{}", job_id),
            Some(token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        match body["status"].as_str() {
            Some("completed") | Some("failed") => return body,
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    panic!("job {} never reached a terminal state", job_id);
}

#[tokio::test]
async fn submitted_job_completes_and_charges_quota() {
    let app = spawn_app().await;
    mount_vendor_success(&app.vendor, "/sf/audio/speech", b"ID3 fake mp3 payload").await;

    let text = "x".repeat(1500); // estimated duration: ceil(1500/150) = 10s
    let (status, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": text, "voiceId": "sf-alex"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["estimatedTime"], 3);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let terminal = poll_until_terminal(&app.state, TOKEN_A, &job_id).await;
    assert_eq!(terminal["status"], "completed");
    assert_eq!(terminal["progress"], 100);
    assert!(terminal.get("error").is_none());

    let audio = &terminal["audio"];
    assert!(audio["url"].as_str().unwrap().ends_with(".mp3"));
    assert_eq!(audio["duration"].as_f64().unwrap(), 10.0);
    assert!(audio["size"].as_i64().unwrap() > 0);

    // Commit uses ceil(actual duration): 590 remaining after charging 10.
    let (_, quota) = send_json(&app.state, "GET", "/api/user/quota", Some(TOKEN_A), None).await;
    assert_eq!(quota["quota"]["used"], 10);
    assert_eq!(quota["quota"]["remaining"], 590);
    assert_eq!(quota["usage"]["today"], 10);

    let (_, usage) = send_json(&app.state, "GET", "/api/user/usage", Some(TOKEN_A), None).await;
    assert_eq!(usage["total"], 1);
    assert_eq!(usage["items"][0]["characters"], 1500);
    assert_eq!(usage["items"][0]["provider"], "siliconflow");
    assert!(usage["items"][0]["audioId"].is_string());
}

#[tokio::test]
async fn terminal_status_query_is_idempotent() {
    let app = spawn_app().await;
    mount_vendor_success(&app.vendor, "/sf/audio/speech", b"bytes").await;

    let (_, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": "hello world", "voiceId": "fish-bella"})),
    )
    .await;
    let job_id = body["jobId"].as_str().unwrap().to_string();
    let first = poll_until_terminal(&app.state, TOKEN_A, &job_id).await;

    for _ in 0..3 {
        let (status, again) = send_json(
            &app.state,
            "GET",
            &format!("/api/tts/status/{}", job_id),
            Some(TOKEN_A),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn quota_exceeded_rejects_before_any_job_row() {
    let app = spawn_app().await;
    provision_user(&app.state, TOKEN_A).await;
    set_quota_used(&app.state, "user-a", 595).await;

    let text = "x".repeat(1500); // requires 10s, only 5 remain
    let (status, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": text, "voiceId": "sf-alex"})),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "QUOTA_EXCEEDED");
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("5"), "message should carry remaining: {message}");
    assert!(message.contains("10"), "message should carry required: {message}");

    assert_eq!(job_count(&app.state).await, 0);
}

#[tokio::test]
async fn exact_boundary_passes_then_next_request_is_rejected() {
    let app = spawn_app().await;
    mount_vendor_success(&app.vendor, "/sf/audio/speech", b"payload").await;
    provision_user(&app.state, TOKEN_A).await;
    set_quota_used(&app.state, "user-a", 590).await;

    // remaining(10) >= required(10): accepted and completed.
    let text = "x".repeat(1500);
    let (status, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": text.clone(), "voiceId": "sf-alex"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["jobId"].as_str().unwrap().to_string();
    let terminal = poll_until_terminal(&app.state, TOKEN_A, &job_id).await;
    assert_eq!(terminal["status"], "completed");

    let (_, quota) = send_json(&app.state, "GET", "/api/user/quota", Some(TOKEN_A), None).await;
    assert_eq!(quota["quota"]["used"], 600);
    assert_eq!(quota["quota"]["remaining"], 0);

    // remaining(0) < required(10): rejected with no new job row.
    let before = job_count(&app.state).await;
    let (status, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": text, "voiceId": "sf-alex"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "QUOTA_EXCEEDED");
    assert_eq!(job_count(&app.state).await, before);
}

#[tokio::test]
async fn provider_failure_marks_job_failed_without_charging_quota() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/sf/audio/speech"))
        .respond_with(ResponseTemplate::new(500).set_body_string("vendor exploded"))
        .mount(&app.vendor)
        .await;

    let (status, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": "please fail", "voiceId": "sf-alex"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let terminal = poll_until_terminal(&app.state, TOKEN_A, &job_id).await;
    assert_eq!(terminal["status"], "failed");
    assert_eq!(terminal["error"]["code"], "PROVIDER_ERROR");
    assert!(terminal["error"]["message"]
        .as_str()
        .unwrap()
        .contains("vendor exploded"));
    assert!(terminal.get("audio").is_none());

    // Quota is only committed on the success path.
    let (_, quota) = send_json(&app.state, "GET", "/api/user/quota", Some(TOKEN_A), None).await;
    assert_eq!(quota["quota"]["used"], 0);

    let (_, usage) = send_json(&app.state, "GET", "/api/user/usage", Some(TOKEN_A), None).await;
    assert_eq!(usage["total"], 0);
}

#[tokio::test]
async fn hung_provider_call_times_out_and_fails_the_job() {
    let app = spawn_app_with(|config| config.provider_timeout_secs = 1).await;
    Mock::given(method("POST"))
        .and(path("/sf/audio/speech"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"too late" as &[u8])
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&app.vendor)
        .await;

    let (status, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": "x".repeat(300), "voiceId": "sf-alex"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let terminal = poll_until_terminal(&app.state, TOKEN_A, &job_id).await;
    assert_eq!(terminal["status"], "failed");
    assert_eq!(terminal["error"]["code"], "PROVIDER_ERROR");
    assert!(terminal["error"]["message"]
        .as_str()
        .unwrap()
        .contains("timed out"));
    assert!(terminal.get("audio").is_none());

    let (_, quota) = send_json(&app.state, "GET", "/api/user/quota", Some(TOKEN_A), None).await;
    assert_eq!(quota["quota"]["used"], 0);
}

#[tokio::test]
async fn stale_reset_timestamp_triggers_lazy_monthly_reset() {
    let app = spawn_app().await;
    provision_user(&app.state, TOKEN_A).await;

    let past = chrono::Utc::now() - chrono::Duration::days(40);
    sqlx::query("UPDATE users SET quota_used = 550, quota_reset_at = ? WHERE external_id = ?")
        .bind(past)
        .bind("user-a")
        .execute(app.state.database.pool())
        .await
        .unwrap();

    let (status, quota) = send_json(&app.state, "GET", "/api/user/quota", Some(TOKEN_A), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quota["quota"]["used"], 0);
    assert_eq!(quota["quota"]["remaining"], 600);

    let reset_at: chrono::DateTime<chrono::Utc> =
        quota["quota"]["resetAt"].as_str().unwrap().parse().unwrap();
    assert!(reset_at > chrono::Utc::now());

    // The reset is persisted, not just reflected in the response.
    let used: i64 =
        sqlx::query_scalar("SELECT quota_used FROM users WHERE external_id = 'user-a'")
            .fetch_one(app.state.database.pool())
            .await
            .unwrap();
    assert_eq!(used, 0);
}

#[tokio::test]
async fn missing_credential_is_a_config_error_not_a_provider_error() {
    let app = spawn_app_with(|config| config.openai_api_key = None).await;

    let (status, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate/sync",
        Some(TOKEN_A),
        Some(json!({"text": "hello", "voiceId": "openai-alloy"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "CONFIG_ERROR");
}

#[tokio::test]
async fn ownership_isolation_on_status_query() {
    let app = spawn_app().await;
    mount_vendor_success(&app.vendor, "/sf/audio/speech", b"bytes").await;

    let (_, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": "mine", "voiceId": "sf-alex"})),
    )
    .await;
    let job_id = body["jobId"].as_str().unwrap().to_string();
    poll_until_terminal(&app.state, TOKEN_A, &job_id).await;

    let (status, body) = send_json(
        &app.state,
        "GET",
        &format!("/api/tts/status/{}", job_id),
        Some(TOKEN_B),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn text_length_boundary_is_enforced_before_quota() {
    let app = spawn_app().await;
    mount_vendor_success(&app.vendor, "/sf/audio/speech", b"bytes").await;

    // Exactly 5000 characters is accepted.
    let (status, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": "x".repeat(5000), "voiceId": "sf-alex"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    poll_until_terminal(&app.state, TOKEN_A, body["jobId"].as_str().unwrap()).await;

    // 5001 characters is rejected before any job or quota interaction.
    let before = job_count(&app.state).await;
    let (status, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": "x".repeat(5001), "voiceId": "sf-alex"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(job_count(&app.state).await, before);
}

#[tokio::test]
async fn sync_mode_returns_bytes_without_durable_records() {
    let app = spawn_app().await;
    mount_vendor_success(&app.vendor, "/sf/audio/speech", b"raw mp3 stream").await;

    let (status, bytes, content_type) = send(
        &app.state,
        "POST",
        "/api/tts/generate/sync",
        Some(TOKEN_A),
        Some(json!({"text": "x".repeat(300), "voiceId": "sf-anna"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("audio/mpeg"));
    assert_eq!(bytes, b"raw mp3 stream");

    // Quota charged with the estimate, usage logged, but no job or audio rows.
    let (_, quota) = send_json(&app.state, "GET", "/api/user/quota", Some(TOKEN_A), None).await;
    assert_eq!(quota["quota"]["used"], 2);

    let (_, usage) = send_json(&app.state, "GET", "/api/user/usage", Some(TOKEN_A), None).await;
    assert_eq!(usage["total"], 1);
    assert!(usage["items"][0]["audioId"].is_null());

    assert_eq!(job_count(&app.state).await, 0);
    let (_, audios) = send_json(&app.state, "GET", "/api/audios", Some(TOKEN_A), None).await;
    assert_eq!(audios["total"], 0);
}

#[tokio::test]
async fn voice_prefix_routes_to_openai() {
    let app = spawn_app().await;
    Mock::given(method("POST"))
        .and(path("/openai/audio/speech"))
        .and(body_partial_json(json!({"model": "tts-1", "voice": "alloy"})))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"openai audio" as &[u8]))
        .mount(&app.vendor)
        .await;

    let (status, bytes, _) = send(
        &app.state,
        "POST",
        "/api/tts/generate/sync",
        Some(TOKEN_A),
        Some(json!({"text": "hi there", "voiceId": "openai-alloy"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"openai audio");

    let (_, usage) = send_json(&app.state, "GET", "/api/user/usage", Some(TOKEN_A), None).await;
    assert_eq!(usage["items"][0]["provider"], "openai");
}

#[tokio::test]
async fn completed_audio_is_listed_and_soft_deletable() {
    let app = spawn_app().await;
    mount_vendor_success(&app.vendor, "/sf/audio/speech", b"audio bytes").await;

    let long_text = "y".repeat(120);
    let (_, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": long_text, "voiceId": "sf-alex"})),
    )
    .await;
    let job_id = body["jobId"].as_str().unwrap().to_string();
    let terminal = poll_until_terminal(&app.state, TOKEN_A, &job_id).await;
    let audio_id = terminal["audio"]["id"].as_str().unwrap().to_string();

    let (status, list) = send_json(&app.state, "GET", "/api/audios", Some(TOKEN_A), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    // List previews are truncated to 100 chars plus an ellipsis.
    assert_eq!(list["items"][0]["text"].as_str().unwrap().chars().count(), 103);

    // Other users cannot see or delete it.
    let (status, _) = send_json(
        &app.state,
        "GET",
        &format!("/api/audios/{}", audio_id),
        Some(TOKEN_B),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(
        &app.state,
        "DELETE",
        &format!("/api/audios/{}", audio_id),
        Some(TOKEN_A),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send_json(
        &app.state,
        "GET",
        &format!("/api/audios/{}", audio_id),
        Some(TOKEN_A),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn job_status_keeps_audio_reference_after_soft_delete() {
    let app = spawn_app().await;
    mount_vendor_success(&app.vendor, "/sf/audio/speech", b"audio bytes").await;

    let (_, body) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some(TOKEN_A),
        Some(json!({"text": "keep my history", "voiceId": "sf-alex"})),
    )
    .await;
    let job_id = body["jobId"].as_str().unwrap().to_string();
    let terminal = poll_until_terminal(&app.state, TOKEN_A, &job_id).await;
    let audio_id = terminal["audio"]["id"].as_str().unwrap().to_string();

    let (status, _, _) = send(
        &app.state,
        "DELETE",
        &format!("/api/audios/{}", audio_id),
        Some(TOKEN_A),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Deleting the library entry does not rewrite job history.
    let (status, after) = send_json(
        &app.state,
        "GET",
        &format!("/api/tts/status/{}", job_id),
        Some(TOKEN_A),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after, terminal);
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let app = spawn_app().await;

    let (status, _) = send_json(&app.state, "GET", "/api/user/quota", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(
        &app.state,
        "POST",
        "/api/tts/generate",
        Some("bogus-token"),
        Some(json!({"text": "hi", "voiceId": "sf-alex"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_endpoints_respond() {
    let app = spawn_app().await;

    let (status, body) = send_json(&app.state, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send_json(&app.state, "GET", "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["checks"]["redis"], "not_configured");
}
