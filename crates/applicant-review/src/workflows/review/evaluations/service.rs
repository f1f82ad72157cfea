use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::catalog::CriteriaCatalog;
use super::consensus::{ConsensusAggregator, ConsensusView};
use super::domain::{
    CompletionRequest, CriterionId, Evaluation, EvaluationId, EvaluationScore, EvaluationStatus,
    ReviewStage,
};
use super::repository::EvaluationRepository;
use super::scores::ScoreStore;
use crate::config::ReviewConfig;
use crate::workflows::review::access::{
    authorize, AuthorizationError, AuthorizationResolver, Capability, Role,
};
use crate::workflows::review::applications::domain::{
    Application, ApplicationId, ApplicationStatus, UserId,
};
use crate::workflows::review::applications::lifecycle::ApplicationStateMachine;
use crate::workflows::review::applications::repository::ApplicationRepository;
use crate::workflows::review::error::{
    ConflictError, RepositoryError, ReviewError, ValidationError,
};
use crate::workflows::review::mutation::retry_transaction;

static EVALUATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_evaluation_id() -> EvaluationId {
    let id = EVALUATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EvaluationId(format!("eval-{id:06}"))
}

/// Stored score plus the evaluation with its re-derived overall score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreUpdate {
    pub score: EvaluationScore,
    pub evaluation: Evaluation,
}

/// Reviewer workflow: assignment, scoring, completion and the consensus read.
pub struct EvaluationService<E, R> {
    evaluations: Arc<E>,
    applications: Arc<R>,
    resolver: Arc<dyn AuthorizationResolver>,
    config: ReviewConfig,
}

impl<E, R> EvaluationService<E, R>
where
    E: EvaluationRepository + 'static,
    R: ApplicationRepository + 'static,
{
    pub fn new(
        evaluations: Arc<E>,
        applications: Arc<R>,
        resolver: Arc<dyn AuthorizationResolver>,
        config: ReviewConfig,
    ) -> Self {
        Self {
            evaluations,
            applications,
            resolver,
            config,
        }
    }

    /// Assign `reviewer` (the caller when `None`) to the application at `stage`.
    ///
    /// Idempotent per `(application, reviewer, stage)`. The first assignment on
    /// a submitted application opens its review.
    pub fn assign(
        &self,
        caller: &UserId,
        application_id: &ApplicationId,
        reviewer: Option<UserId>,
        stage: ReviewStage,
    ) -> Result<Evaluation, ReviewError> {
        let application = self.application(application_id)?;
        let reviewer = reviewer.unwrap_or_else(|| caller.clone());
        let capability = if &reviewer == caller {
            Capability::Score
        } else {
            Capability::Decide
        };
        authorize(self.resolver.as_ref(), caller, &application, capability)?;

        let reviewable = matches!(
            application.status,
            ApplicationStatus::Submitted
                | ApplicationStatus::UnderReview
                | ApplicationStatus::Waitlisted
        );
        if !reviewable {
            return Err(ConflictError::NotReviewable {
                status: application.status,
            }
            .into());
        }

        let evaluation = match self
            .evaluations
            .find_evaluation(application_id, &reviewer, stage)?
        {
            Some(existing) => existing,
            None => self.create_evaluation(&application, &reviewer, stage)?,
        };

        // re-read so a decision that landed meanwhile is never overwritten
        let key = format!("{application_id}/review");
        let started = retry_transaction(&self.config.retry, &key, || {
            let mut current = self.application(application_id)?;
            if !ApplicationStateMachine::begin_review(&mut current, Utc::now()) {
                return Ok(false);
            }
            self.applications.update(current)?;
            Ok(true)
        })?;
        if started {
            info!(application_id = %application_id, "review started");
        }

        Ok(evaluation)
    }

    pub fn upsert_score(
        &self,
        caller: &UserId,
        evaluation_id: &EvaluationId,
        criterion_id: &CriterionId,
        score: f64,
        reasoning: Option<String>,
    ) -> Result<ScoreUpdate, ReviewError> {
        let evaluation = self.owned_evaluation(caller, evaluation_id)?;
        if evaluation.is_completed() {
            return Err(ConflictError::EvaluationCompleted(evaluation.id).into());
        }

        let catalog = self.catalog(&evaluation)?;
        let store = ScoreStore::new(self.evaluations.as_ref(), &self.config.retry);
        let stored = store.upsert(&catalog, &evaluation, criterion_id, score, reasoning, Utc::now())?;

        let scores = store.scores(&evaluation)?;
        let overall =
            catalog.overall_score(evaluation.stage, &scores, self.config.consensus.score_scale);
        // re-read so a completion that landed meanwhile is not overwritten
        let current = self
            .evaluations
            .evaluation(evaluation_id)?
            .ok_or_else(|| ReviewError::not_found("evaluation", evaluation_id))?;
        let evaluation = if overall != current.overall_score && !current.is_completed() {
            self.evaluations.update_evaluation(Evaluation {
                overall_score: overall,
                ..current
            })?
        } else {
            current
        };

        debug!(
            evaluation_id = %evaluation_id,
            criterion_id = %criterion_id,
            "criterion scored"
        );
        Ok(ScoreUpdate {
            score: stored,
            evaluation,
        })
    }

    /// Close the evaluation; it then counts toward the decision-grade consensus.
    pub fn complete(
        &self,
        caller: &UserId,
        evaluation_id: &EvaluationId,
        request: CompletionRequest,
    ) -> Result<Evaluation, ReviewError> {
        let mut evaluation = self.owned_evaluation(caller, evaluation_id)?;
        if evaluation.is_completed() {
            return Err(ConflictError::EvaluationCompleted(evaluation.id).into());
        }

        if let Some(confidence) = request.confidence {
            if !(1..=5).contains(&confidence) {
                return Err(ValidationError::InvalidConfidence(confidence).into());
            }
        }

        let catalog = self.catalog(&evaluation)?;
        let scores = self.evaluations.scores(&evaluation.id)?;
        let missing = catalog.unscored(evaluation.stage, &scores);
        if !missing.is_empty() {
            return Err(ValidationError::UnscoredCriteria { missing }.into());
        }

        let scale = self.config.consensus.score_scale;
        let overall = match request.overall_score {
            Some(value) if !value.is_finite() || !(0.0..=scale).contains(&value) => {
                return Err(ValidationError::InvalidOverallScore(value).into());
            }
            Some(value) => Some(value),
            None => catalog.overall_score(evaluation.stage, &scores, scale),
        };

        let now = Utc::now();
        evaluation.status = EvaluationStatus::Completed;
        evaluation.completed_at = Some(now);
        evaluation.overall_score = overall;
        evaluation.confidence = request.confidence;
        evaluation.recommendation = Some(request.recommendation);

        let evaluation = self.evaluations.update_evaluation(evaluation)?;
        info!(
            evaluation_id = %evaluation.id,
            application_id = %evaluation.application_id,
            stage = %evaluation.stage,
            "evaluation completed"
        );
        Ok(evaluation)
    }

    /// Put a completed evaluation back into edit mode.
    pub fn reopen(
        &self,
        caller: &UserId,
        evaluation_id: &EvaluationId,
    ) -> Result<Evaluation, ReviewError> {
        let mut evaluation = self.owned_evaluation(caller, evaluation_id)?;
        if !evaluation.is_completed() {
            return Err(ConflictError::EvaluationInProgress(evaluation.id).into());
        }

        evaluation.status = EvaluationStatus::InProgress;
        evaluation.completed_at = None;
        let evaluation = self.evaluations.update_evaluation(evaluation)?;
        info!(evaluation_id = %evaluation.id, "evaluation reopened");
        Ok(evaluation)
    }

    /// Recompute the consensus for an application from the current evaluations.
    pub fn consensus_view(
        &self,
        caller: &UserId,
        application_id: &ApplicationId,
        stage: Option<ReviewStage>,
    ) -> Result<ConsensusView, ReviewError> {
        let application = self.application(application_id)?;
        authorize(
            self.resolver.as_ref(),
            caller,
            &application,
            Capability::ViewConsensus,
        )?;

        let catalog = CriteriaCatalog::new(
            application.event_id.clone(),
            self.evaluations.criteria(&application.event_id)?,
        )?;
        let evaluations = self.evaluations.evaluations_for(application_id)?;

        let mut competencies = HashMap::new();
        for evaluation in &evaluations {
            if !competencies.contains_key(&evaluation.reviewer_id) {
                let declared = self.evaluations.competencies(&evaluation.reviewer_id)?;
                competencies.insert(evaluation.reviewer_id.clone(), declared);
            }
        }

        let aggregator = ConsensusAggregator::new(
            &catalog,
            &self.config.weighting,
            &self.config.consensus,
        );
        Ok(aggregator.aggregate(&application, &evaluations, &competencies, stage))
    }

    fn create_evaluation(
        &self,
        application: &Application,
        reviewer: &UserId,
        stage: ReviewStage,
    ) -> Result<Evaluation, ReviewError> {
        let evaluation = Evaluation {
            id: next_evaluation_id(),
            application_id: application.id.clone(),
            event_id: application.event_id.clone(),
            reviewer_id: reviewer.clone(),
            stage,
            status: EvaluationStatus::InProgress,
            overall_score: None,
            confidence: None,
            recommendation: None,
            created_at: Utc::now(),
            completed_at: None,
        };

        match self.evaluations.insert_evaluation(evaluation) {
            Ok(created) => {
                info!(
                    evaluation_id = %created.id,
                    application_id = %application.id,
                    reviewer_id = %reviewer,
                    stage = %stage,
                    "evaluation assigned"
                );
                Ok(created)
            }
            Err(RepositoryError::Conflict) => self
                .evaluations
                .find_evaluation(&application.id, reviewer, stage)?
                .ok_or_else(|| ReviewError::Repository(RepositoryError::Conflict)),
            Err(other) => Err(other.into()),
        }
    }

    /// Load an evaluation the caller may work on: their own, or any as admin.
    fn owned_evaluation(
        &self,
        caller: &UserId,
        evaluation_id: &EvaluationId,
    ) -> Result<Evaluation, ReviewError> {
        let evaluation = self
            .evaluations
            .evaluation(evaluation_id)?
            .ok_or_else(|| ReviewError::not_found("evaluation", evaluation_id))?;
        let application = self.application(&evaluation.application_id)?;
        let role = authorize(self.resolver.as_ref(), caller, &application, Capability::Score)?;

        if role != Role::Admin && &evaluation.reviewer_id != caller {
            return Err(AuthorizationError {
                caller: caller.clone(),
                target: format!("evaluation {evaluation_id}"),
                role,
                capability: Capability::Score,
            }
            .into());
        }

        Ok(evaluation)
    }

    fn catalog(&self, evaluation: &Evaluation) -> Result<CriteriaCatalog, ReviewError> {
        Ok(CriteriaCatalog::new(
            evaluation.event_id.clone(),
            self.evaluations.criteria(&evaluation.event_id)?,
        )?)
    }

    fn application(&self, id: &ApplicationId) -> Result<Application, ReviewError> {
        self.applications
            .fetch(id)?
            .ok_or_else(|| ReviewError::not_found("application", id))
    }
}
