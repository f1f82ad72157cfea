use chrono::{DateTime, Utc};

use super::catalog::CriteriaCatalog;
use super::domain::{CriterionId, Evaluation, EvaluationScore};
use super::repository::EvaluationRepository;
use crate::workflows::review::error::ReviewError;
use crate::workflows::review::mutation::{upsert_with_retry, RetryPolicy};

/// One score per `(evaluation, criterion)`; concurrent writers converge on a
/// single row holding the last committed value.
pub struct ScoreStore<'a, E: ?Sized> {
    repository: &'a E,
    retry: &'a RetryPolicy,
}

impl<'a, E> ScoreStore<'a, E>
where
    E: EvaluationRepository + ?Sized,
{
    pub fn new(repository: &'a E, retry: &'a RetryPolicy) -> Self {
        Self { repository, retry }
    }

    pub fn upsert(
        &self,
        catalog: &CriteriaCatalog,
        evaluation: &Evaluation,
        criterion_id: &CriterionId,
        score: f64,
        reasoning: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<EvaluationScore, ReviewError> {
        catalog.validate_score(evaluation.stage, criterion_id, score)?;

        let key = format!("{}/{}", evaluation.id, criterion_id);
        upsert_with_retry(
            self.retry,
            &key,
            || self.repository.score(&evaluation.id, criterion_id),
            || {
                self.repository.insert_score(EvaluationScore {
                    evaluation_id: evaluation.id.clone(),
                    criterion_id: criterion_id.clone(),
                    score,
                    reasoning: reasoning.clone(),
                    updated_at: now,
                })
            },
            |existing: &EvaluationScore| {
                self.repository.update_score(EvaluationScore {
                    score,
                    reasoning: reasoning.clone(),
                    updated_at: now,
                    ..existing.clone()
                })
            },
        )
    }

    pub fn scores(&self, evaluation: &Evaluation) -> Result<Vec<EvaluationScore>, ReviewError> {
        Ok(self.repository.scores(&evaluation.id)?)
    }
}
