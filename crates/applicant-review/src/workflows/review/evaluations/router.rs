use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use super::domain::{CompletionRequest, CriterionId, EvaluationId, ReviewStage};
use super::repository::EvaluationRepository;
use super::service::EvaluationService;
use crate::workflows::review::access::caller_from_headers;
use crate::workflows::review::applications::domain::{ApplicationId, UserId};
use crate::workflows::review::applications::repository::ApplicationRepository;
use crate::workflows::review::error::respond_blocking;

type SharedService<E, R> = Arc<EvaluationService<E, R>>;

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    /// Defaults to the caller (self-assignment).
    #[serde(default)]
    pub reviewer_id: Option<UserId>,
    pub stage: ReviewStage,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub score: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsensusQuery {
    #[serde(default)]
    pub stage: Option<ReviewStage>,
}

/// Router builder exposing reviewer workflow and consensus endpoints.
pub fn evaluation_router<E, R>(service: SharedService<E, R>) -> Router
where
    E: EvaluationRepository + 'static,
    R: ApplicationRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications/:application_id/evaluations",
            post(assign_handler::<E, R>),
        )
        .route(
            "/api/v1/applications/:application_id/consensus",
            get(consensus_handler::<E, R>),
        )
        .route(
            "/api/v1/evaluations/:evaluation_id/scores/:criterion_id",
            put(score_handler::<E, R>),
        )
        .route(
            "/api/v1/evaluations/:evaluation_id/complete",
            post(complete_handler::<E, R>),
        )
        .route(
            "/api/v1/evaluations/:evaluation_id/reopen",
            post(reopen_handler::<E, R>),
        )
        .with_state(service)
}

pub(crate) async fn assign_handler<E, R>(
    State(service): State<SharedService<E, R>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(request): Json<AssignRequest>,
) -> Response
where
    E: EvaluationRepository + 'static,
    R: ApplicationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || {
        service.assign(
            &caller,
            &ApplicationId(application_id),
            request.reviewer_id,
            request.stage,
        )
    })
    .await
}

pub(crate) async fn score_handler<E, R>(
    State(service): State<SharedService<E, R>>,
    headers: HeaderMap,
    Path((evaluation_id, criterion_id)): Path<(String, String)>,
    Json(request): Json<ScoreRequest>,
) -> Response
where
    E: EvaluationRepository + 'static,
    R: ApplicationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || {
        service.upsert_score(
            &caller,
            &EvaluationId(evaluation_id),
            &CriterionId(criterion_id),
            request.score,
            request.reasoning,
        )
    })
    .await
}

pub(crate) async fn complete_handler<E, R>(
    State(service): State<SharedService<E, R>>,
    headers: HeaderMap,
    Path(evaluation_id): Path<String>,
    Json(request): Json<CompletionRequest>,
) -> Response
where
    E: EvaluationRepository + 'static,
    R: ApplicationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || service.complete(&caller, &EvaluationId(evaluation_id), request)).await
}

pub(crate) async fn reopen_handler<E, R>(
    State(service): State<SharedService<E, R>>,
    headers: HeaderMap,
    Path(evaluation_id): Path<String>,
) -> Response
where
    E: EvaluationRepository + 'static,
    R: ApplicationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || service.reopen(&caller, &EvaluationId(evaluation_id))).await
}

pub(crate) async fn consensus_handler<E, R>(
    State(service): State<SharedService<E, R>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Query(query): Query<ConsensusQuery>,
) -> Response
where
    E: EvaluationRepository + 'static,
    R: ApplicationRepository + 'static,
{
    let caller = match caller_from_headers(&headers) {
        Ok(caller) => caller,
        Err(rejection) => return rejection,
    };
    respond_blocking(move || {
        service.consensus_view(&caller, &ApplicationId(application_id), query.stage)
    })
    .await
}
