use super::domain::{
    CriterionId, Evaluation, EvaluationCriterion, EvaluationId, EvaluationScore, ReviewStage,
    ReviewerCompetency,
};
use crate::workflows::review::applications::domain::{ApplicationId, EventId, UserId};
use crate::workflows::review::error::RepositoryError;

/// Storage for rubrics, reviewer competencies, evaluations and their scores.
///
/// Implementations enforce uniqueness of `(application, reviewer, stage)` for
/// evaluations and of `(evaluation, criterion)` for scores.
pub trait EvaluationRepository: Send + Sync {
    fn criteria(&self, event: &EventId) -> Result<Vec<EvaluationCriterion>, RepositoryError>;
    fn competencies(&self, reviewer: &UserId) -> Result<Vec<ReviewerCompetency>, RepositoryError>;

    /// Fails with `Conflict` when the reviewer already has an evaluation at this stage.
    fn insert_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, RepositoryError>;
    fn update_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, RepositoryError>;
    fn evaluation(&self, id: &EvaluationId) -> Result<Option<Evaluation>, RepositoryError>;
    fn find_evaluation(
        &self,
        application: &ApplicationId,
        reviewer: &UserId,
        stage: ReviewStage,
    ) -> Result<Option<Evaluation>, RepositoryError>;
    fn evaluations_for(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<Evaluation>, RepositoryError>;

    fn score(
        &self,
        evaluation: &EvaluationId,
        criterion: &CriterionId,
    ) -> Result<Option<EvaluationScore>, RepositoryError>;
    fn scores(&self, evaluation: &EvaluationId) -> Result<Vec<EvaluationScore>, RepositoryError>;
    /// Fails with `Conflict` when a score for the key already exists.
    fn insert_score(&self, score: EvaluationScore) -> Result<EvaluationScore, RepositoryError>;
    /// Fails with `NotFound` when no score for the key exists yet.
    fn update_score(&self, score: EvaluationScore) -> Result<EvaluationScore, RepositoryError>;
}
