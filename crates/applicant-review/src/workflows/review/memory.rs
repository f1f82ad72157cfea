//! Process-local store backing both repository traits.
//!
//! Used by the demo server and the test suites. A single mutex guards all
//! tables so batch commits are trivially atomic: writes are applied to a staged
//! copy that replaces the live tables only when every write succeeded.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::applications::completeness::FormTemplate;
use super::applications::domain::{
    Application, ApplicationId, ApplicationType, EventId, FieldResponse, UserId,
};
use super::applications::repository::{ApplicationRepository, Write, WriteBatch};
use super::error::RepositoryError;
use super::evaluations::domain::{
    CriterionId, Evaluation, EvaluationCriterion, EvaluationId, EvaluationScore, ReviewStage,
    ReviewerCompetency,
};
use super::evaluations::repository::EvaluationRepository;

#[derive(Debug, Clone, Default)]
struct Tables {
    applications: BTreeMap<ApplicationId, Application>,
    responses: BTreeMap<(ApplicationId, String), FieldResponse>,
    templates: HashMap<(EventId, ApplicationType), FormTemplate>,
    enrichment_claims: BTreeSet<(UserId, ApplicationId)>,
    criteria: HashMap<EventId, Vec<EvaluationCriterion>>,
    competencies: HashMap<UserId, Vec<ReviewerCompetency>>,
    evaluations: BTreeMap<EvaluationId, Evaluation>,
    scores: BTreeMap<(EvaluationId, CriterionId), EvaluationScore>,
}

impl Tables {
    fn check_unique(&self, candidate: &Application) -> Result<(), RepositoryError> {
        let email = candidate.applicant_email.trim().to_lowercase();
        let clash = self.applications.values().any(|existing| {
            existing.id != candidate.id
                && existing.event_id == candidate.event_id
                && (existing.applicant_id == candidate.applicant_id
                    || existing.applicant_email.trim().to_lowercase() == email)
        });
        if clash {
            Err(RepositoryError::Conflict)
        } else {
            Ok(())
        }
    }

    fn save_application(&mut self, candidate: &Application) -> Result<Application, RepositoryError> {
        let stored = self
            .applications
            .get(&candidate.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != candidate.version {
            return Err(RepositoryError::Conflict);
        }
        self.check_unique(candidate)?;

        let mut saved = candidate.clone();
        saved.version += 1;
        self.applications.insert(saved.id.clone(), saved.clone());
        Ok(saved)
    }

    fn apply(&mut self, write: &Write) -> Result<Option<Application>, RepositoryError> {
        match write {
            Write::SaveApplication(application) => self.save_application(application).map(Some),
            Write::UpsertResponse(response) => {
                if !self.applications.contains_key(&response.application_id) {
                    return Err(RepositoryError::NotFound);
                }
                self.responses.insert(
                    (response.application_id.clone(), response.field_key.clone()),
                    response.clone(),
                );
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// Index of the batch write that fails on the next commit.
    fail_write_at: Option<usize>,
    /// Number of upcoming commits rejected with `Conflict`.
    conflicting_commits: u32,
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    faults: Faults,
}

/// Shared handle; clones see the same tables.
#[derive(Debug, Default, Clone)]
pub struct InMemoryReviewStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    pub fn set_form_template(
        &self,
        event: EventId,
        application_type: ApplicationType,
        template: FormTemplate,
    ) -> Result<(), RepositoryError> {
        self.lock()?
            .tables
            .templates
            .insert((event, application_type), template);
        Ok(())
    }

    pub fn set_criteria(
        &self,
        event: EventId,
        criteria: Vec<EvaluationCriterion>,
    ) -> Result<(), RepositoryError> {
        self.lock()?.tables.criteria.insert(event, criteria);
        Ok(())
    }

    pub fn set_competencies(
        &self,
        reviewer: UserId,
        competencies: Vec<ReviewerCompetency>,
    ) -> Result<(), RepositoryError> {
        self.lock()?.tables.competencies.insert(reviewer, competencies);
        Ok(())
    }

    /// Make the next commit fail with `Unavailable` when it reaches write `index`.
    pub fn fail_write_at(&self, index: usize) -> Result<(), RepositoryError> {
        self.lock()?.faults.fail_write_at = Some(index);
        Ok(())
    }

    /// Reject the next `count` commits with `Conflict`, as a busy database would.
    pub fn conflict_next_commits(&self, count: u32) -> Result<(), RepositoryError> {
        self.lock()?.faults.conflicting_commits = count;
        Ok(())
    }

    pub fn application_count(&self) -> Result<usize, RepositoryError> {
        Ok(self.lock()?.tables.applications.len())
    }
}

impl ApplicationRepository for InMemoryReviewStore {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.tables.applications.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.tables.check_unique(&application)?;
        guard
            .tables
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update(&self, application: Application) -> Result<Application, RepositoryError> {
        self.lock()?.tables.save_application(&application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        Ok(self.lock()?.tables.applications.get(id).cloned())
    }

    fn find_for_applicant(
        &self,
        applicant: &UserId,
        event: &EventId,
    ) -> Result<Option<Application>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .applications
            .values()
            .find(|app| &app.applicant_id == applicant && &app.event_id == event)
            .cloned())
    }

    fn for_event(&self, event: &EventId) -> Result<Vec<Application>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .applications
            .values()
            .filter(|app| &app.event_id == event)
            .cloned()
            .collect())
    }

    fn form_template(
        &self,
        event: &EventId,
        application_type: ApplicationType,
    ) -> Result<Option<FormTemplate>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .templates
            .get(&(event.clone(), application_type))
            .cloned())
    }

    fn response(
        &self,
        application: &ApplicationId,
        field_key: &str,
    ) -> Result<Option<FieldResponse>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .responses
            .get(&(application.clone(), field_key.to_string()))
            .cloned())
    }

    fn responses(&self, application: &ApplicationId) -> Result<Vec<FieldResponse>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .responses
            .values()
            .filter(|response| &response.application_id == application)
            .cloned()
            .collect())
    }

    fn insert_response(&self, response: FieldResponse) -> Result<FieldResponse, RepositoryError> {
        let mut guard = self.lock()?;
        let key = (response.application_id.clone(), response.field_key.clone());
        if guard.tables.responses.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        guard.tables.apply(&Write::UpsertResponse(response.clone()))?;
        Ok(response)
    }

    fn update_response(&self, response: FieldResponse) -> Result<FieldResponse, RepositoryError> {
        let mut guard = self.lock()?;
        let key = (response.application_id.clone(), response.field_key.clone());
        match guard.tables.responses.get_mut(&key) {
            Some(slot) => {
                *slot = response.clone();
                Ok(response)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn commit(&self, batch: WriteBatch) -> Result<Vec<Application>, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.faults.conflicting_commits > 0 {
            guard.faults.conflicting_commits -= 1;
            return Err(RepositoryError::Conflict);
        }

        let fail_at = guard.faults.fail_write_at.take();
        let mut staged = guard.tables.clone();
        let mut saved = Vec::new();
        for (index, write) in batch.writes().iter().enumerate() {
            if fail_at == Some(index) {
                return Err(RepositoryError::Unavailable(format!(
                    "write {index} of {} failed",
                    batch.len()
                )));
            }
            saved.extend(staged.apply(write)?);
        }

        guard.tables = staged;
        Ok(saved)
    }

    fn claim_enrichment(
        &self,
        user: &UserId,
        application: &ApplicationId,
    ) -> Result<bool, RepositoryError> {
        let mut guard = self.lock()?;
        Ok(guard
            .tables
            .enrichment_claims
            .insert((user.clone(), application.clone())))
    }
}

impl EvaluationRepository for InMemoryReviewStore {
    fn criteria(&self, event: &EventId) -> Result<Vec<EvaluationCriterion>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.tables.criteria.get(event).cloned().unwrap_or_default())
    }

    fn competencies(&self, reviewer: &UserId) -> Result<Vec<ReviewerCompetency>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .competencies
            .get(reviewer)
            .cloned()
            .unwrap_or_default())
    }

    fn insert_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, RepositoryError> {
        let mut guard = self.lock()?;
        let taken = guard.tables.evaluations.values().any(|existing| {
            existing.id == evaluation.id
                || (existing.application_id == evaluation.application_id
                    && existing.reviewer_id == evaluation.reviewer_id
                    && existing.stage == evaluation.stage)
        });
        if taken {
            return Err(RepositoryError::Conflict);
        }
        guard
            .tables
            .evaluations
            .insert(evaluation.id.clone(), evaluation.clone());
        Ok(evaluation)
    }

    fn update_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, RepositoryError> {
        let mut guard = self.lock()?;
        match guard.tables.evaluations.get_mut(&evaluation.id) {
            Some(slot) => {
                *slot = evaluation.clone();
                Ok(evaluation)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn evaluation(&self, id: &EvaluationId) -> Result<Option<Evaluation>, RepositoryError> {
        Ok(self.lock()?.tables.evaluations.get(id).cloned())
    }

    fn find_evaluation(
        &self,
        application: &ApplicationId,
        reviewer: &UserId,
        stage: ReviewStage,
    ) -> Result<Option<Evaluation>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .evaluations
            .values()
            .find(|evaluation| {
                &evaluation.application_id == application
                    && &evaluation.reviewer_id == reviewer
                    && evaluation.stage == stage
            })
            .cloned())
    }

    fn evaluations_for(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<Evaluation>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .evaluations
            .values()
            .filter(|evaluation| &evaluation.application_id == application)
            .cloned()
            .collect())
    }

    fn score(
        &self,
        evaluation: &EvaluationId,
        criterion: &CriterionId,
    ) -> Result<Option<EvaluationScore>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .scores
            .get(&(evaluation.clone(), criterion.clone()))
            .cloned())
    }

    fn scores(&self, evaluation: &EvaluationId) -> Result<Vec<EvaluationScore>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .tables
            .scores
            .values()
            .filter(|score| &score.evaluation_id == evaluation)
            .cloned()
            .collect())
    }

    fn insert_score(&self, score: EvaluationScore) -> Result<EvaluationScore, RepositoryError> {
        let mut guard = self.lock()?;
        if !guard.tables.evaluations.contains_key(&score.evaluation_id) {
            return Err(RepositoryError::NotFound);
        }
        let key = (score.evaluation_id.clone(), score.criterion_id.clone());
        if guard.tables.scores.contains_key(&key) {
            return Err(RepositoryError::Conflict);
        }
        guard.tables.scores.insert(key, score.clone());
        Ok(score)
    }

    fn update_score(&self, score: EvaluationScore) -> Result<EvaluationScore, RepositoryError> {
        let mut guard = self.lock()?;
        let key = (score.evaluation_id.clone(), score.criterion_id.clone());
        match guard.tables.scores.get_mut(&key) {
            Some(slot) => {
                *slot = score.clone();
                Ok(score)
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}
