use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Caller, ChildId, ParentId, Role, UserId,
    WorkshopId,
};
use super::repository::{ApplicationStore, Page, WorkshopStore};
use super::service::{CreateApplication, CreateOutcome, EnrollmentError, EnrollmentService, StatusUpdate};

/// Router builder exposing the enrollment HTTP endpoints. The caller
/// identity arrives pre-authenticated in `x-user-id` / `x-user-role`
/// headers; claims extraction is the gateway's job.
pub fn enrollment_router<A, W>(service: Arc<EnrollmentService<A, W>>) -> Router
where
    A: ApplicationStore + 'static,
    W: WorkshopStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/enrollment/applications",
            post(create_handler::<A, W>),
        )
        .route(
            "/api/v1/enrollment/applications/:application_id",
            get(get_handler::<A, W>),
        )
        .route(
            "/api/v1/enrollment/applications/:application_id/status",
            patch(update_handler::<A, W>),
        )
        .route(
            "/api/v1/enrollment/workshops/:workshop_id/applications",
            get(list_handler::<A, W>),
        )
        .route("/api/v1/enrollment/limits", get(limits_handler::<A, W>))
        .route(
            "/api/v1/enrollment/workshops/:workshop_id/capacity/reconcile",
            post(reconcile_handler::<A, W>),
        )
        .route(
            "/api/v1/enrollment/maintenance/promote-studying",
            post(promote_handler::<A, W>),
        )
        .with_state(service)
}

fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, Response> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty());
    let role = headers
        .get("x-user-role")
        .and_then(|value| value.to_str().ok())
        .and_then(Role::parse);

    match (user_id, role) {
        (Some(user_id), Some(role)) => Ok(Caller {
            user_id: UserId(user_id.to_string()),
            role,
        }),
        _ => {
            let payload = json!({
                "error": "missing or invalid x-user-id / x-user-role headers",
                "code": "unauthenticated",
            });
            Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response())
        }
    }
}

fn error_response(error: EnrollmentError) -> Response {
    let status = match &error {
        EnrollmentError::AccessDenied => StatusCode::FORBIDDEN,
        EnrollmentError::ApplicationNotFound(_) | EnrollmentError::WorkshopNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        EnrollmentError::Conflict => StatusCode::CONFLICT,
        EnrollmentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };

    let payload = json!({
        "error": error.to_string(),
        "code": error.code(),
    });
    (status, Json(payload)).into_response()
}

pub(crate) async fn create_handler<A, W>(
    State(service): State<Arc<EnrollmentService<A, W>>>,
    headers: HeaderMap,
    Json(request): Json<CreateApplication>,
) -> Response
where
    A: ApplicationStore + 'static,
    W: WorkshopStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match service.create(&caller, request) {
        Ok(CreateOutcome::Created(application)) => {
            (StatusCode::CREATED, Json(application.view())).into_response()
        }
        Ok(CreateOutcome::RateLimited {
            retry_after_seconds,
        }) => {
            let payload = json!({
                "code": "rate_limited",
                "retry_after_seconds": retry_after_seconds,
            });
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(
                    header::RETRY_AFTER,
                    retry_after_seconds.max(0).to_string(),
                )],
                Json(payload),
            )
                .into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<A, W>(
    State(service): State<Arc<EnrollmentService<A, W>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    A: ApplicationStore + 'static,
    W: WorkshopStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match service.get(&caller, &ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler<A, W>(
    State(service): State<Arc<EnrollmentService<A, W>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Response
where
    A: ApplicationStore + 'static,
    W: WorkshopStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    match service.update_status(&caller, &ApplicationId(application_id), update) {
        Ok(application) => (StatusCode::OK, Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_page_limit")]
    limit: usize,
}

fn default_page_limit() -> usize {
    50
}

pub(crate) async fn list_handler<A, W>(
    State(service): State<Arc<EnrollmentService<A, W>>>,
    headers: HeaderMap,
    Path(workshop_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Response
where
    A: ApplicationStore + 'static,
    W: WorkshopStore + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(response) => return response,
    };

    let page = Page {
        offset: query.offset,
        limit: query.limit,
    };
    match service.list_for_workshop(&caller, &WorkshopId(workshop_id), page) {
        Ok(applications) => {
            let views: Vec<_> = applications
                .iter()
                .map(Application::view)
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LimitsQuery {
    parent_id: String,
    child_id: String,
    workshop_id: String,
}

pub(crate) async fn limits_handler<A, W>(
    State(service): State<Arc<EnrollmentService<A, W>>>,
    Query(query): Query<LimitsQuery>,
) -> Response
where
    A: ApplicationStore + 'static,
    W: WorkshopStore + 'static,
{
    let decision = service.check_rate_limit(
        &ParentId(query.parent_id),
        &ChildId(query.child_id),
        &WorkshopId(query.workshop_id),
        chrono::Utc::now(),
    );

    match decision {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReconcileRequest {
    from: ApplicationStatus,
    to: ApplicationStatus,
}

pub(crate) async fn reconcile_handler<A, W>(
    State(service): State<Arc<EnrollmentService<A, W>>>,
    Path(workshop_id): Path<String>,
    Json(request): Json<ReconcileRequest>,
) -> Response
where
    A: ApplicationStore + 'static,
    W: WorkshopStore + 'static,
{
    let workshop_id = WorkshopId(workshop_id);
    match service.reconcile_workshop_capacity(&workshop_id, request.from, request.to) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn promote_handler<A, W>(
    State(service): State<Arc<EnrollmentService<A, W>>>,
) -> Response
where
    A: ApplicationStore + 'static,
    W: WorkshopStore + 'static,
{
    match service.promote_approved_to_studying() {
        Ok(affected) => (StatusCode::OK, Json(json!({ "affected": affected }))).into_response(),
        Err(error) => error_response(error),
    }
}
