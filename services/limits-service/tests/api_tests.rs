use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use petsflow_limits_service::{create_router, ApiState, LimitsDatabase, LimitsServiceConfig};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    _data_dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let data_dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = LimitsServiceConfig {
            data_dir: data_dir.path().to_path_buf(),
            ..Default::default()
        };
        let database =
            Arc::new(LimitsDatabase::new(&config.data_dir).expect("failed to open database"));
        let router = create_router(Arc::new(ApiState::new(database, config)));
        Self {
            router,
            _data_dir: data_dir,
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("valid request"))
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn create_client(&self, tenant: &str, name: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            &format!("/api/tenants/{tenant}/records"),
            Some(json!({ "resource": "client", "name": name })),
        )
        .await
    }
}

#[tokio::test]
async fn health_reports_service_name() {
    let app = TestApp::new();
    let (status, body) = app.send("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "limits-service");
}

#[tokio::test]
async fn trial_tenant_is_blocked_at_fifth_client() {
    let app = TestApp::new();

    for i in 0..5 {
        let (status, body) = app.create_client("tenant-a", &format!("Client {i}")).await;
        assert_eq!(status, StatusCode::CREATED, "client {i}: {body}");
        assert_eq!(body["resource"], "client");
    }

    let (status, body) = app.create_client("tenant-a", "Client 5").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "limit_exceeded");
    assert_eq!(body["details"]["action_type"], "clients");
    assert_eq!(body["details"]["current_count"], 5);
    assert_eq!(body["details"]["max_allowed"], 5);
    assert_eq!(body["details"]["package_name"], "trial");
    assert_eq!(body["details"]["usage_percentage"], 100);
}

#[tokio::test]
async fn soft_limit_is_reported_before_block() {
    let app = TestApp::new();
    for i in 0..4 {
        app.create_client("tenant-a", &format!("Client {i}")).await;
    }

    let (status, decision) = app
        .send("GET", "/api/tenants/tenant-a/limits/clients", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decision["can_perform"], true);
    assert_eq!(decision["usage_percentage"], 80);
    assert_eq!(decision["is_at_soft_limit"], true);
    assert_eq!(decision["is_at_limit"], false);
}

#[tokio::test]
async fn create_response_carries_soft_limit_warning() {
    let app = TestApp::new();
    for i in 0..3 {
        let (_, body) = app.create_client("tenant-a", &format!("Client {i}")).await;
        assert_eq!(body["limit_check"]["is_at_soft_limit"], false);
    }

    let (status, body) = app.create_client("tenant-a", "Client 3").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "Client 3");
    assert_eq!(body["limit_check"]["current_count"], 3);
    assert_eq!(body["limit_check"]["usage_percentage"], 60);
    assert_eq!(body["limit_check"]["is_at_soft_limit"], false);

    let (status, body) = app.create_client("tenant-a", "Client 4").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["limit_check"]["current_count"], 4);
    assert_eq!(body["limit_check"]["max_allowed"], 5);
    assert_eq!(body["limit_check"]["package_name"], "trial");
    assert_eq!(body["limit_check"]["usage_percentage"], 80);
    assert_eq!(body["limit_check"]["is_at_soft_limit"], true);
    assert_eq!(body["limit_check"]["can_perform"], true);
}

#[tokio::test]
async fn validate_reports_limit_exceeded_reason() {
    let app = TestApp::new();
    let (status, _) = app
        .send(
            "POST",
            "/api/tenants/tenant-a/records",
            Some(json!({ "resource": "specialization", "name": "Dermatology" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(
            "POST",
            "/api/tenants/tenant-a/limits/specializations/validate",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["can_proceed"], false);
    assert_eq!(body["reason"], "limit_exceeded");

    let (_, body) = app
        .send("POST", "/api/tenants/tenant-a/limits/services/validate", None)
        .await;
    assert_eq!(body["can_proceed"], true);
    assert_eq!(body["reason"], Value::Null);
}

#[tokio::test]
async fn paid_subscription_lifts_limits_until_cancelled() {
    let app = TestApp::new();
    for i in 0..5 {
        app.create_client("tenant-a", &format!("Client {i}")).await;
    }

    let (status, _) = app
        .send(
            "PUT",
            "/api/tenants/tenant-a/subscription",
            Some(json!({
                "package_name": "professional",
                "max_clients": 100,
                "max_pets": 40,
                "max_services": 20,
                "max_specializations": 5,
                "ends_at": (Utc::now() + Duration::days(30)).to_rfc3339(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.create_client("tenant-a", "Client 5").await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (_, limits) = app
        .send("GET", "/api/tenants/tenant-a/subscription", None)
        .await;
    assert_eq!(limits["package_name"], "professional");

    let (status, _) = app
        .send("DELETE", "/api/tenants/tenant-a/subscription", None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, limits) = app
        .send("GET", "/api/tenants/tenant-a/subscription", None)
        .await;
    assert_eq!(limits["package_name"], "trial");

    let (status, _) = app.create_client("tenant-a", "Client 6").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn expired_subscription_resolves_to_trial() {
    let app = TestApp::new();
    let (status, _) = app
        .send(
            "PUT",
            "/api/tenants/tenant-a/subscription",
            Some(json!({
                "package_name": "professional",
                "max_clients": 100,
                "max_pets": 40,
                "max_services": 20,
                "max_specializations": 5,
                "starts_at": (Utc::now() - Duration::days(60)).to_rfc3339(),
                "ends_at": (Utc::now() - Duration::days(30)).to_rfc3339(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, limits) = app
        .send("GET", "/api/tenants/tenant-a/subscription", None)
        .await;
    assert_eq!(limits["package_name"], "trial");
    assert_eq!(limits["max_clients"], 5);
}

#[tokio::test]
async fn deleting_a_record_frees_capacity() {
    let app = TestApp::new();
    let mut ids = Vec::new();
    for i in 0..5 {
        let (_, body) = app.create_client("tenant-a", &format!("Client {i}")).await;
        ids.push(body["id"].as_str().expect("id").to_string());
    }

    let (status, body) = app
        .send(
            "DELETE",
            &format!("/api/tenants/tenant-a/records/clients/{}", ids[0]),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, _) = app.create_client("tenant-a", "Replacement").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .send(
            "DELETE",
            &format!("/api/tenants/tenant-a/records/clients/{}", ids[0]),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "record_not_found");
}

#[tokio::test]
async fn pet_for_unknown_client_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "POST",
            "/api/tenants/tenant-a/records",
            Some(json!({
                "resource": "pet",
                "client_id": "2b0d7c9e-0f43-4f8e-9d5a-52b8c2a1e4f7",
                "name": "Luna",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn usage_overview_lists_every_resource() {
    let app = TestApp::new();
    let (_, client) = app.create_client("tenant-a", "Anna").await;
    let (status, _) = app
        .send(
            "POST",
            "/api/tenants/tenant-a/records",
            Some(json!({
                "resource": "pet",
                "client_id": client["id"],
                "name": "Burek",
                "species": "dog",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, overview) = app.send("GET", "/api/tenants/tenant-a/limits", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["package_name"], "trial");
    assert_eq!(overview["usage"]["clients_count"], 1);
    assert_eq!(overview["usage"]["pets_count"], 1);
    assert_eq!(overview["decisions"].as_array().map(Vec::len), Some(4));
}

#[tokio::test]
async fn tenants_do_not_share_usage() {
    let app = TestApp::new();
    for i in 0..5 {
        app.create_client("tenant-a", &format!("Client {i}")).await;
    }

    let (status, _) = app.create_client("tenant-b", "First").await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, decision) = app
        .send("GET", "/api/tenants/tenant-b/limits/clients", None)
        .await;
    assert_eq!(decision["current_count"], 1);
}

#[tokio::test]
async fn rejects_invalid_input() {
    let app = TestApp::new();

    let (status, body) = app
        .send("GET", "/api/tenants/tenant-a/limits/visits", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_action");

    let (status, body) = app
        .send("GET", "/api/tenants/bad%20tenant/limits", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_tenant_id");

    let (status, body) = app.create_client("tenant-a", "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_record");

    let (status, body) = app
        .send(
            "PUT",
            "/api/tenants/tenant-a/subscription",
            Some(json!({
                "package_name": "professional",
                "max_clients": 100,
                "max_pets": 40,
                "max_services": 20,
                "max_specializations": 5,
                "starts_at": Utc::now().to_rfc3339(),
                "ends_at": (Utc::now() - Duration::days(1)).to_rfc3339(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_subscription");
}

#[tokio::test]
async fn cancelling_without_subscription_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app
        .send("DELETE", "/api/tenants/tenant-a/subscription", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "subscription_not_found");
}
