use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::completeness::{CompletenessChecker, CompletenessReport, FormTemplate};
use super::domain::{
    Application, ApplicationId, ApplicationStatus, EditIntent, EventId, FieldResponse,
    NewApplication, Outcome, ResponseEntry, UserId,
};
use super::lifecycle::{ApplicationStateMachine, EditContext};
use super::repository::{
    ApplicationRepository, NotificationSender, ProfileEnricher, WriteBatch,
};
use super::waitlist::WaitlistRanker;
use crate::workflows::review::access::{authorize, authorize_event, AuthorizationResolver, Capability};
use crate::workflows::review::error::{
    ConflictError, RepositoryError, ReviewError, ValidationError,
};
use crate::workflows::review::mutation::{retry_transaction, upsert_with_retry, RetryPolicy};

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// Result of a single-field save.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseUpdate {
    pub response: FieldResponse,
    pub application: Application,
    pub completeness: CompletenessReport,
}

/// Result of an atomic multi-field save.
#[derive(Debug, Clone, Serialize)]
pub struct BulkResponseUpdate {
    pub responses: Vec<FieldResponse>,
    pub application: Application,
    pub completeness: CompletenessReport,
}

/// Service composing the repository, lifecycle rules and applicant messaging.
pub struct ApplicationService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    resolver: Arc<dyn AuthorizationResolver>,
    enricher: Option<Arc<dyn ProfileEnricher>>,
    retry: RetryPolicy,
}

impl<R, N> ApplicationService<R, N>
where
    R: ApplicationRepository + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        resolver: Arc<dyn AuthorizationResolver>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            repository,
            notifier,
            resolver,
            enricher: None,
            retry,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn ProfileEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Return the caller's application for the event, creating a draft on first call.
    pub fn create_or_get(
        &self,
        caller: &UserId,
        request: NewApplication,
    ) -> Result<Application, ReviewError> {
        if caller != &request.applicant_id {
            authorize_event(
                self.resolver.as_ref(),
                caller,
                &request.event_id,
                Capability::Decide,
            )?;
        }

        if let Some(existing) = self
            .repository
            .find_for_applicant(&request.applicant_id, &request.event_id)?
        {
            return Ok(existing);
        }

        let applicant_id = request.applicant_id.clone();
        let event_id = request.event_id.clone();
        let email = request.applicant_email.clone();
        let draft = Application::draft(next_application_id(), request, Utc::now());

        match self.repository.insert(draft) {
            Ok(created) => {
                info!(application_id = %created.id, event_id = %event_id, "application created");
                Ok(created)
            }
            Err(RepositoryError::Conflict) => {
                // lost the creation race, or the e-mail is taken by another applicant
                match self.repository.find_for_applicant(&applicant_id, &event_id)? {
                    Some(existing) => Ok(existing),
                    None => Err(ConflictError::DuplicateEmail {
                        email,
                        event: event_id,
                    }
                    .into()),
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    pub fn get(&self, caller: &UserId, id: &ApplicationId) -> Result<Application, ReviewError> {
        let application = self.load(id)?;
        authorize(self.resolver.as_ref(), caller, &application, Capability::View)?;
        Ok(application)
    }

    /// Save one answer, recompute completeness and apply the reversion rule.
    pub fn upsert_response(
        &self,
        caller: &UserId,
        id: &ApplicationId,
        field_key: &str,
        value: String,
        intent: EditIntent,
    ) -> Result<ResponseUpdate, ReviewError> {
        let application = self.load(id)?;
        let role = authorize(
            self.resolver.as_ref(),
            caller,
            &application,
            Capability::EditResponses,
        )?;
        let template = self.template_for(&application)?;
        let field = template
            .field(field_key)
            .ok_or_else(|| ValidationError::UnknownField(field_key.to_string()))?;
        ApplicationStateMachine::ensure_editable(&application, role, field)?;
        let intent = ApplicationStateMachine::effective_intent(role, intent);

        let now = Utc::now();
        let key = format!("{id}/{field_key}");
        let response = upsert_with_retry(
            &self.retry,
            &key,
            || self.repository.response(id, field_key),
            || {
                self.repository.insert_response(FieldResponse {
                    application_id: id.clone(),
                    field_key: field_key.to_string(),
                    value: value.clone(),
                    updated_at: now,
                })
            },
            |existing: &FieldResponse| {
                self.repository.update_response(FieldResponse {
                    value: value.clone(),
                    updated_at: now,
                    ..existing.clone()
                })
            },
        )?;

        // a concurrent decision may move the application between read and save
        let (application, report, effect) = retry_transaction(&self.retry, &key, || {
            let mut application = self.load(id)?;
            let answers = self.answers(id)?;
            let report =
                CompletenessChecker::new(&template).check(&answers, application.is_complete);
            let context = EditContext {
                intent,
                touches_required: template.is_required(field_key, &answers),
                speaker_exempt: ApplicationStateMachine::speaker_exempt(&application, field),
            };
            let effect =
                ApplicationStateMachine::apply_edit(&mut application, context, &report, now);
            let application = self.repository.update(application)?;
            Ok((application, report, effect))
        })?;

        if effect.reverted_to_draft {
            info!(application_id = %id, field_key, "autosave reverted submission to draft");
        }
        if effect.just_completed {
            self.notify(&application, Outcome::FormCompleted);
        }

        Ok(ResponseUpdate {
            response,
            application,
            completeness: report,
        })
    }

    /// Save many answers in one all-or-nothing batch.
    pub fn bulk_upsert_responses(
        &self,
        caller: &UserId,
        id: &ApplicationId,
        entries: Vec<ResponseEntry>,
        intent: EditIntent,
    ) -> Result<BulkResponseUpdate, ReviewError> {
        if entries.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }

        let application = self.load(id)?;
        let role = authorize(
            self.resolver.as_ref(),
            caller,
            &application,
            Capability::EditResponses,
        )?;
        let template = self.template_for(&application)?;
        let intent = ApplicationStateMachine::effective_intent(role, intent);

        // later entries for the same key win
        let mut latest: BTreeMap<String, String> = BTreeMap::new();
        for entry in entries {
            let field = template
                .field(&entry.field_key)
                .ok_or_else(|| ValidationError::UnknownField(entry.field_key.clone()))?;
            ApplicationStateMachine::ensure_editable(&application, role, field)?;
            latest.insert(entry.field_key, entry.value);
        }

        let key = format!("{id}/bulk");
        retry_transaction(&self.retry, &key, || {
            let now = Utc::now();
            let mut application = self
                .repository
                .fetch(id)?
                .ok_or(RepositoryError::NotFound)?;
            let mut answers = self.answers_from_store(id)?;
            let mut batch = WriteBatch::new();
            let mut responses = Vec::with_capacity(latest.len());

            for (field_key, value) in &latest {
                answers.insert(field_key.clone(), value.clone());
                let response = FieldResponse {
                    application_id: id.clone(),
                    field_key: field_key.clone(),
                    value: value.clone(),
                    updated_at: now,
                };
                batch.upsert_response(response.clone());
                responses.push(response);
            }

            let report =
                CompletenessChecker::new(&template).check(&answers, application.is_complete);
            let context = EditContext {
                intent,
                touches_required: latest
                    .keys()
                    .any(|field_key| template.is_required(field_key, &answers)),
                speaker_exempt: latest.keys().all(|field_key| {
                    template.field(field_key).is_some_and(|field| {
                        ApplicationStateMachine::speaker_exempt(&application, field)
                    })
                }),
            };
            let effect = ApplicationStateMachine::apply_edit(&mut application, context, &report, now);
            batch.save_application(application);

            let application = self
                .repository
                .commit(batch)?
                .pop()
                .ok_or(RepositoryError::NotFound)?;
            Ok((responses, application, report, effect))
        })
        .map(|(responses, application, completeness, effect)| {
            debug!(application_id = %id, fields = responses.len(), "bulk responses committed");
            if effect.just_completed {
                self.notify(&application, Outcome::FormCompleted);
            }
            BulkResponseUpdate {
                responses,
                application,
                completeness,
            }
        })
    }

    pub fn submit(&self, caller: &UserId, id: &ApplicationId) -> Result<Application, ReviewError> {
        let application = self.load(id)?;
        authorize(
            self.resolver.as_ref(),
            caller,
            &application,
            Capability::EditResponses,
        )?;
        let template = self.template_for(&application)?;

        let key = format!("{id}/submit");
        let application = retry_transaction(&self.retry, &key, || {
            let mut application = self.load(id)?;
            let answers = self.answers(id)?;
            let report =
                CompletenessChecker::new(&template).check(&answers, application.is_complete);
            ApplicationStateMachine::submit(&mut application, &report, Utc::now())?;
            Ok(self.repository.update(application)?)
        })?;
        info!(application_id = %id, "application submitted");
        self.notify(&application, Outcome::Submitted);
        Ok(application)
    }

    /// Administrative decision on a single application.
    pub fn update_status(
        &self,
        caller: &UserId,
        id: &ApplicationId,
        to: ApplicationStatus,
    ) -> Result<Application, ReviewError> {
        let mut updated = self.bulk_update_status(caller, std::slice::from_ref(id), to)?;
        updated
            .pop()
            .ok_or_else(|| ReviewError::not_found("application", id))
    }

    /// Decide many applications at once. Any rejected transition aborts the whole batch.
    pub fn bulk_update_status(
        &self,
        caller: &UserId,
        ids: &[ApplicationId],
        to: ApplicationStatus,
    ) -> Result<Vec<Application>, ReviewError> {
        if ids.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }

        let mut unique: Vec<&ApplicationId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        let (decided, changed) = retry_transaction(&self.retry, "status-batch", || {
            let now = Utc::now();
            let mut decided = Vec::with_capacity(unique.len());
            let mut changed = Vec::new();
            for id in &unique {
                let mut application = self.load(id)?;
                authorize(self.resolver.as_ref(), caller, &application, Capability::Decide)?;
                let transition = ApplicationStateMachine::decide(&mut application, to, now)?;
                if transition.changed {
                    changed.push((application.clone(), transition.from));
                }
                decided.push(application);
            }

            if changed.is_empty() {
                return Ok((decided, changed));
            }
            let saved = self.repository.commit(self.decision_batch(&changed, now)?)?;
            // decided rows lead the batch, in order
            for (slot, stored) in changed.iter_mut().zip(saved) {
                slot.0 = stored;
            }
            for application in decided.iter_mut() {
                if let Some((stored, _)) = changed.iter().find(|(row, _)| row.id == application.id) {
                    *application = stored.clone();
                }
            }
            Ok((decided, changed))
        })?;

        for (application, from) in &changed {
            info!(
                application_id = %application.id,
                from = %from,
                to = %to,
                "application status changed"
            );
            self.notify(application, Outcome::StatusChanged(to));
            if to == ApplicationStatus::Accepted {
                self.enrich_on_acceptance(application);
            }
        }

        Ok(decided)
    }

    /// Rank a waitlisted application; returns the event's waitlist in display order.
    pub fn set_waitlist_position(
        &self,
        caller: &UserId,
        id: &ApplicationId,
        position: u32,
    ) -> Result<Vec<Application>, ReviewError> {
        self.rerank(caller, id, |event_applications, now| {
            WaitlistRanker::place(event_applications, id, position, now)
        })
    }

    pub fn clear_waitlist_position(
        &self,
        caller: &UserId,
        id: &ApplicationId,
    ) -> Result<Vec<Application>, ReviewError> {
        self.rerank(caller, id, |event_applications, now| {
            WaitlistRanker::clear(event_applications, id, now)
        })
    }

    pub fn ordered_waitlist(
        &self,
        caller: &UserId,
        event: &EventId,
    ) -> Result<Vec<Application>, ReviewError> {
        authorize_event(self.resolver.as_ref(), caller, event, Capability::ViewConsensus)?;
        let applications = self.repository.for_event(event)?;
        Ok(WaitlistRanker::ordered(&applications))
    }

    fn rerank<F>(
        &self,
        caller: &UserId,
        id: &ApplicationId,
        ranking: F,
    ) -> Result<Vec<Application>, ReviewError>
    where
        F: Fn(&[Application], chrono::DateTime<Utc>) -> Result<Vec<Application>, ReviewError>,
    {
        let application = self.load(id)?;
        authorize(self.resolver.as_ref(), caller, &application, Capability::Decide)?;

        // every shifted row is version-checked, so a stale snapshot never commits
        let key = format!("{}/waitlist", application.event_id);
        let changed = retry_transaction(&self.retry, &key, || {
            let event_applications = self.repository.for_event(&application.event_id)?;
            let changed = ranking(&event_applications, Utc::now())?;

            let mut batch = WriteBatch::new();
            for row in changed {
                batch.save_application(row);
            }
            Ok(self.repository.commit(batch)?)
        })?;
        debug!(application_id = %id, shifted = changed.len(), "waitlist reordered");

        let event_applications = self.repository.for_event(&application.event_id)?;
        Ok(WaitlistRanker::ordered(&event_applications))
    }

    /// Persist decided applications together with the compaction of any
    /// waitlist they left.
    fn decision_batch(
        &self,
        changed: &[(Application, ApplicationStatus)],
        now: chrono::DateTime<Utc>,
    ) -> Result<WriteBatch, ReviewError> {
        let mut batch = WriteBatch::new();
        let mut touched_events: HashMap<EventId, Vec<&Application>> = HashMap::new();
        for (application, from) in changed {
            batch.save_application(application.clone());
            if *from == ApplicationStatus::Waitlisted {
                touched_events
                    .entry(application.event_id.clone())
                    .or_default()
                    .push(application);
            }
        }

        for (event, leaving) in touched_events {
            let mut event_applications = self.repository.for_event(&event)?;
            for slot in event_applications.iter_mut() {
                if let Some(decided) = leaving.iter().find(|app| app.id == slot.id) {
                    *slot = (*decided).clone();
                }
            }
            for row in WaitlistRanker::compact(&event_applications, now) {
                batch.save_application(row);
            }
        }

        Ok(batch)
    }

    fn load(&self, id: &ApplicationId) -> Result<Application, ReviewError> {
        self.repository
            .fetch(id)?
            .ok_or_else(|| ReviewError::not_found("application", id))
    }

    fn template_for(&self, application: &Application) -> Result<FormTemplate, ReviewError> {
        self.repository
            .form_template(&application.event_id, application.application_type)?
            .ok_or_else(|| {
                ReviewError::not_found(
                    "form template",
                    format!(
                        "{}/{}",
                        application.event_id,
                        application.application_type.label()
                    ),
                )
            })
    }

    fn answers(&self, id: &ApplicationId) -> Result<BTreeMap<String, String>, ReviewError> {
        Ok(self.answers_from_store(id)?)
    }

    fn answers_from_store(
        &self,
        id: &ApplicationId,
    ) -> Result<BTreeMap<String, String>, RepositoryError> {
        Ok(self
            .repository
            .responses(id)?
            .into_iter()
            .map(|response| (response.field_key, response.value))
            .collect())
    }

    fn notify(&self, application: &Application, outcome: Outcome) {
        if let Err(error) = self.notifier.send(application, outcome) {
            warn!(
                application_id = %application.id,
                template = %outcome.template(),
                %error,
                "notification failed; continuing"
            );
        }
    }

    fn enrich_on_acceptance(&self, application: &Application) {
        let Some(enricher) = &self.enricher else {
            return;
        };

        match self
            .repository
            .claim_enrichment(&application.applicant_id, &application.id)
        {
            Ok(true) => {
                if let Err(error) = enricher.enrich(application) {
                    warn!(application_id = %application.id, %error, "profile enrichment failed");
                }
            }
            Ok(false) => {
                debug!(application_id = %application.id, "profile already enriched");
            }
            Err(error) => {
                warn!(application_id = %application.id, %error, "could not claim enrichment");
            }
        }
    }
}
