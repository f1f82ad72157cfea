use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use super::access::AuthorizationError;
use super::applications::completeness::FormTemplateError;
use super::applications::domain::{ApplicationStatus, EventId};
use super::evaluations::catalog::CatalogError;
use super::evaluations::domain::{CriterionId, EvaluationId};

/// Error raised by the review services. Every variant maps to a distinct caller action.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("write to {key} abandoned after {attempts} conflicting attempts; retry later")]
    ConcurrencyExhausted { key: String, attempts: u32 },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Template(#[from] FormTemplateError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ReviewError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Input problems the caller has to fix; never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("required fields missing: {}", .missing.join(", "))]
    MissingFields { missing: Vec<String> },
    #[error("field {0} is not part of this application form")]
    UnknownField(String),
    #[error("criterion {0} is not part of this event's rubric")]
    UnknownCriterion(CriterionId),
    #[error("score {score} for criterion {criterion} must be within [{min}, {max}]")]
    ScoreOutOfBounds {
        criterion: CriterionId,
        score: f64,
        min: f64,
        max: f64,
    },
    #[error("confidence {0} must be between 1 and 5")]
    InvalidConfidence(u8),
    #[error("overall score {0} is outside the score range")]
    InvalidOverallScore(f64),
    #[error("criteria still unscored: {}", .missing.join(", "))]
    UnscoredCriteria { missing: Vec<String> },
    #[error("waitlist position must be at least 1")]
    InvalidPosition,
    #[error("request contained no entries")]
    EmptyBatch,
}

/// The request is well-formed but collides with the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("application is {status}; only draft applications can be submitted")]
    NotDraft { status: ApplicationStatus },
    #[error("application cannot move from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("{email} has already applied to event {event}")]
    DuplicateEmail { email: String, event: EventId },
    #[error("application is {status} and no longer accepts these edits")]
    Locked { status: ApplicationStatus },
    #[error("application is {status}; only waitlisted applications can be ranked")]
    NotWaitlisted { status: ApplicationStatus },
    #[error("application is {status} and is not open for review")]
    NotReviewable { status: ApplicationStatus },
    #[error("evaluation {0} is completed; reopen it before editing")]
    EvaluationCompleted(EvaluationId),
    #[error("evaluation {0} is still in progress")]
    EvaluationInProgress(EvaluationId),
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        let status = match &self {
            ReviewError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ReviewError::Conflict(_) => StatusCode::CONFLICT,
            ReviewError::Authorization(_) => StatusCode::FORBIDDEN,
            ReviewError::NotFound { .. } => StatusCode::NOT_FOUND,
            ReviewError::ConcurrencyExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ReviewError::Catalog(_) | ReviewError::Template(_) | ReviewError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut payload = json!({ "error": self.to_string() });
        match &self {
            ReviewError::Validation(ValidationError::MissingFields { missing }) => {
                payload["missing_fields"] = json!(missing);
            }
            ReviewError::Conflict(
                ConflictError::NotDraft { status }
                | ConflictError::Locked { status }
                | ConflictError::NotWaitlisted { status }
                | ConflictError::NotReviewable { status },
            ) => {
                payload["status"] = json!(status);
            }
            _ => {}
        }

        (status, Json(payload)).into_response()
    }
}

/// `200` with the JSON body, or the error's own status mapping.
pub(crate) fn respond<T: Serialize>(result: Result<T, ReviewError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Run a synchronous service call on the blocking pool, then [`respond`].
///
/// Service calls may sleep between conflict retries.
pub(crate) async fn respond_blocking<T, F>(call: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce() -> Result<T, ReviewError> + Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(result) => respond(result),
        Err(join_error) => {
            error!(%join_error, "service call aborted");
            ReviewError::Repository(RepositoryError::Unavailable(join_error.to_string()))
                .into_response()
        }
    }
}
