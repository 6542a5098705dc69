use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::workflows::enrollment::domain::{
    ApplicationStatus, ChildId, ParentId, WorkshopId,
};
use crate::workflows::enrollment::limiter::SubmissionLimits;
use crate::workflows::enrollment::router::enrollment_router;
use crate::workflows::enrollment::service::{CreateApplication, CreateOutcome};

use super::common::{
    harness, harness_with_limits, parent_caller, Harness, CHILD, PARENT, PROVIDER, WORKSHOP,
};

fn routed(harness: &Harness) -> Router {
    enrollment_router(harness.service.clone())
}

fn post_json(uri: &str, user: &str, role: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-user-id", user)
        .header("x-user-role", role)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn create_body() -> Value {
    json!({
        "parent_id": PARENT,
        "child_id": CHILD,
        "workshop_id": WORKSHOP,
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body is readable");
    serde_json::from_slice(&bytes).expect("body is json")
}

#[tokio::test]
async fn create_returns_created_with_the_application_view() {
    let harness = harness();
    harness.put_workshop(10);

    let response = routed(&harness)
        .oneshot(post_json(
            "/api/v1/enrollment/applications",
            "user-parent",
            "parent",
            create_body(),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["workshop_id"], WORKSHOP);
}

#[tokio::test]
async fn missing_identity_headers_are_unauthorized() {
    let harness = harness();
    harness.put_workshop(10);

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/enrollment/applications")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(create_body().to_string()))
        .expect("request builds");

    let response = routed(&harness)
        .oneshot(request)
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn unknown_roles_are_unauthorized() {
    let harness = harness();
    harness.put_workshop(10);

    let response = routed(&harness)
        .oneshot(post_json(
            "/api/v1/enrollment/applications",
            "user-parent",
            "superuser",
            create_body(),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submission_limit_maps_to_429_with_retry_after() {
    let harness = harness_with_limits(SubmissionLimits {
        limit: 1,
        limit_days: 7,
    });
    harness.put_workshop(10);
    harness.seed_application(
        "a-old",
        CHILD,
        ApplicationStatus::Rejected,
        Utc::now() - Duration::days(1),
    );

    let response = routed(&harness)
        .oneshot(post_json(
            "/api/v1/enrollment/applications",
            "user-parent",
            "parent",
            create_body(),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .expect("retry-after header present")
        .to_str()
        .expect("header is ascii")
        .parse::<i64>()
        .expect("header is a number");
    assert!(retry_after > 0);

    let body = body_json(response).await;
    assert_eq!(body["code"], "rate_limited");
}

#[tokio::test]
async fn missing_applications_are_not_found() {
    let harness = harness();
    harness.put_workshop(10);

    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/enrollment/applications/app-nope")
        .header("x-user-id", "user-parent")
        .header("x-user-role", "parent")
        .body(Body::empty())
        .expect("request builds");

    let response = routed(&harness)
        .oneshot(request)
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn forbidden_transitions_are_unprocessable() {
    let harness = harness();
    harness.put_workshop(10);
    let request = CreateApplication {
        parent_id: ParentId(PARENT.to_string()),
        child_id: ChildId(CHILD.to_string()),
        workshop_id: WorkshopId(WORKSHOP.to_string()),
    };
    let id = match harness
        .service
        .create(&parent_caller(), request)
        .expect("create succeeds")
    {
        CreateOutcome::Created(application) => application.id,
        CreateOutcome::RateLimited { .. } => panic!("fixture create hit the submission limit"),
    };

    let request = Request::builder()
        .method("PATCH")
        .uri(format!("/api/v1/enrollment/applications/{id}/status"))
        .header("x-user-id", "user-parent")
        .header("x-user-role", "parent")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "status": "approved",
                "parent_id": PARENT,
                "workshop_id": WORKSHOP,
                "provider_id": PROVIDER,
            })
            .to_string(),
        ))
        .expect("request builds");

    let response = routed(&harness)
        .oneshot(request)
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "forbidden_transition");
}

#[tokio::test]
async fn workshop_listing_returns_the_views() {
    let harness = harness();
    harness.put_workshop(10);
    harness.seed_application("a-1", CHILD, ApplicationStatus::Pending, Utc::now());

    let request = Request::builder()
        .method("GET")
        .uri(format!(
            "/api/v1/enrollment/workshops/{WORKSHOP}/applications?limit=5"
        ))
        .header("x-user-id", "user-provider")
        .header("x-user-role", "provider")
        .body(Body::empty())
        .expect("request builds");

    let response = routed(&harness)
        .oneshot(request)
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let entries = body.as_array().expect("body is an array");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], "a-1");
}

#[tokio::test]
async fn limits_endpoint_reports_the_decision() {
    let harness = harness();
    harness.put_workshop(10);

    let request = Request::builder()
        .method("GET")
        .uri(format!(
            "/api/v1/enrollment/limits?parent_id={PARENT}&child_id={CHILD}&workshop_id={WORKSHOP}"
        ))
        .body(Body::empty())
        .expect("request builds");

    let response = routed(&harness)
        .oneshot(request)
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["allowed"], true);
}

#[tokio::test]
async fn promote_endpoint_reports_the_affected_count() {
    let harness = harness();
    harness.put_workshop(10);
    harness.seed_application("a-1", CHILD, ApplicationStatus::Approved, Utc::now());

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/enrollment/maintenance/promote-studying")
        .body(Body::empty())
        .expect("request builds");

    let response = routed(&harness)
        .oneshot(request)
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["affected"], 1);
}
