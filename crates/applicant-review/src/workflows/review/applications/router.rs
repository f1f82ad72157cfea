use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{
    ApplicationId, ApplicationStatus, ApplicationType, EditIntent, EventId, NewApplication,
    ResponseEntry, UserId,
};
use super::repository::{ApplicationRepository, NotificationSender};
use super::service::ApplicationService;
use crate::workflows::review::access::caller_from_headers;
use crate::workflows::review::error::respond_blocking;

type SharedService<R, N> = Arc<ApplicationService<R, N>>;

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    /// Defaults to the caller; admins may create on behalf of an applicant.
    #[serde(default)]
    pub applicant_id: Option<UserId>,
    pub applicant_email: String,
    pub application_type: ApplicationType,
}

#[derive(Debug, Deserialize)]
pub struct ResponseRequest {
    pub value: String,
    #[serde(default)]
    pub intent: EditIntent,
}

#[derive(Debug, Deserialize)]
pub struct BulkResponseRequest {
    pub entries: Vec<ResponseEntry>,
    #[serde(default)]
    pub intent: EditIntent,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ApplicationStatus,
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusRequest {
    pub application_ids: Vec<ApplicationId>,
    pub status: ApplicationStatus,
}

#[derive(Debug, Deserialize)]
pub struct WaitlistPositionRequest {
    pub position: u32,
}

/// Router builder exposing the application lifecycle endpoints.
pub fn application_router<R, N>(service: SharedService<R, N>) -> Router
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    Router::new()
        .route(
            "/api/v1/events/:event_id/applications",
            post(create_handler::<R, N>),
        )
        .route(
            "/api/v1/events/:event_id/waitlist",
            get(waitlist_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/status",
            post(bulk_status_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(get_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/responses",
            put(bulk_responses_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/responses/:field_key",
            put(response_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/submit",
            post(submit_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/status",
            post(status_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/waitlist-position",
            put(set_position_handler::<R, N>).delete(clear_position_handler::<R, N>),
        )
        .with_state(service)
}

pub(crate) async fn create_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
    Json(request): Json<CreateApplicationRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };

    let request = NewApplication {
        applicant_id: request.applicant_id.unwrap_or_else(|| caller.clone()),
        applicant_email: request.applicant_email,
        event_id: EventId(event_id),
        application_type: request.application_type,
    };
    respond_blocking(move || service.create_or_get(&caller, request)).await
}

pub(crate) async fn get_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || service.get(&caller, &ApplicationId(application_id))).await
}

pub(crate) async fn response_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    headers: HeaderMap,
    Path((application_id, field_key)): Path<(String, String)>,
    Json(request): Json<ResponseRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || {
        service.upsert_response(
            &caller,
            &ApplicationId(application_id),
            &field_key,
            request.value,
            request.intent,
        )
    })
    .await
}

pub(crate) async fn bulk_responses_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(request): Json<BulkResponseRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || {
        service.bulk_upsert_responses(
            &caller,
            &ApplicationId(application_id),
            request.entries,
            request.intent,
        )
    })
    .await
}

pub(crate) async fn submit_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || service.submit(&caller, &ApplicationId(application_id))).await
}

pub(crate) async fn status_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || {
        service.update_status(&caller, &ApplicationId(application_id), request.status)
    })
    .await
}

pub(crate) async fn bulk_status_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    headers: HeaderMap,
    Json(request): Json<BulkStatusRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || {
        service.bulk_update_status(&caller, &request.application_ids, request.status)
    })
    .await
}

pub(crate) async fn set_position_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(request): Json<WaitlistPositionRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || {
        service.set_waitlist_position(
            &caller,
            &ApplicationId(application_id),
            request.position,
        )
    })
    .await
}

pub(crate) async fn clear_position_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || {
        service.clear_waitlist_position(&caller, &ApplicationId(application_id))
    })
    .await
}

pub(crate) async fn waitlist_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    headers: HeaderMap,
    Path(event_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || service.ordered_waitlist(&caller, &EventId(event_id))).await
}
