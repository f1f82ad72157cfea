use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use serde_json::Value;

use crate::workflows::review::access::{AuthorizationResolver, RosterResolver, CALLER_HEADER};
use crate::workflows::review::applications::completeness::{FieldDefinition, FormTemplate};
use crate::workflows::review::applications::domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationType, EditIntent, EventId,
    NewApplication, Outcome, UserId,
};
use crate::workflows::review::applications::domain::FieldResponse;
use crate::workflows::review::applications::repository::{
    ApplicationRepository, EnrichmentError, NotificationSender, NotifyError, ProfileEnricher,
    WriteBatch,
};
use crate::workflows::review::error::RepositoryError;
use crate::workflows::review::applications::{application_router, ApplicationService};
use crate::workflows::review::memory::InMemoryReviewStore;
use crate::workflows::review::mutation::RetryPolicy;

pub(super) const ADMIN: &str = "admin-1";
pub(super) const REVIEWER: &str = "rev-1";
pub(super) const APPLICANT: &str = "u-1";

pub(super) type TestService = ApplicationService<InMemoryReviewStore, RecordingNotifier>;

pub(super) fn user(id: &str) -> UserId {
    UserId::new(id)
}

pub(super) fn event() -> EventId {
    EventId::new("evt-2026")
}

pub(super) fn resident_template() -> FormTemplate {
    FormTemplate::new(vec![
        FieldDefinition::required("full_name", "Full name"),
        FieldDefinition::required("motivation", "Why do you want to join?"),
        FieldDefinition::optional("has_dietary_needs", "Any dietary needs?"),
        FieldDefinition::required_when(
            "dietary_details",
            "Dietary details",
            "has_dietary_needs",
            "yes",
        ),
        FieldDefinition::optional("portfolio_url", "Portfolio"),
    ])
    .expect("valid resident template")
}

pub(super) fn speaker_template() -> FormTemplate {
    FormTemplate::new(vec![
        FieldDefinition::required("full_name", "Full name"),
        FieldDefinition::required("talk_title", "Talk title"),
        FieldDefinition::required("arrival_time", "Arrival time").editable_after_submit(),
    ])
    .expect("valid speaker template")
}

pub(super) fn resolver() -> Arc<dyn AuthorizationResolver> {
    Arc::new(RosterResolver::new([user(ADMIN)], [user(REVIEWER)]))
}

pub(super) fn instant_retry() -> RetryPolicy {
    RetryPolicy::new(5, Duration::ZERO)
}

pub(super) fn seeded_store() -> Arc<InMemoryReviewStore> {
    let store = Arc::new(InMemoryReviewStore::new());
    store
        .set_form_template(event(), ApplicationType::Resident, resident_template())
        .expect("seed resident template");
    store
        .set_form_template(event(), ApplicationType::Speaker, speaker_template())
        .expect("seed speaker template");
    store
}

pub(super) fn build_service() -> (TestService, Arc<InMemoryReviewStore>, Arc<RecordingNotifier>) {
    let store = seeded_store();
    let notifier = Arc::new(RecordingNotifier::default());
    let service =
        ApplicationService::new(store.clone(), notifier.clone(), resolver(), instant_retry());
    (service, store, notifier)
}

/// Service over the same tables whose reads stall for `delay`.
pub(super) fn slow_service(
    store: &Arc<InMemoryReviewStore>,
    delay: Duration,
) -> ApplicationService<SlowReads, RecordingNotifier> {
    let slow = Arc::new(SlowReads {
        inner: store.clone(),
        delay,
    });
    ApplicationService::new(
        slow,
        Arc::new(RecordingNotifier::default()),
        resolver(),
        instant_retry(),
    )
}

pub(super) fn new_application(applicant: &str, application_type: ApplicationType) -> NewApplication {
    NewApplication {
        applicant_id: user(applicant),
        applicant_email: format!("{applicant}@example.org"),
        event_id: event(),
        application_type,
    }
}

/// Draft with every required field answered.
pub(super) fn complete_draft<N>(
    service: &ApplicationService<InMemoryReviewStore, N>,
    applicant: &str,
    application_type: ApplicationType,
) -> Application
where
    N: NotificationSender + 'static,
{
    let caller = user(applicant);
    let application = service
        .create_or_get(&caller, new_application(applicant, application_type))
        .expect("application created");

    let answers: &[(&str, &str)] = match application_type {
        ApplicationType::Speaker => &[
            ("full_name", "Grace Hopper"),
            ("talk_title", "Compilers for everyone"),
            ("arrival_time", "09:00"),
        ],
        _ => &[("full_name", "Ada Lovelace"), ("motivation", "Engines")],
    };
    for (key, value) in answers {
        service
            .upsert_response(
                &caller,
                &application.id,
                key,
                value.to_string(),
                EditIntent::Autosave,
            )
            .expect("answer saved");
    }

    service.get(&caller, &application.id).expect("draft readable")
}

pub(super) fn submitted<N>(
    service: &ApplicationService<InMemoryReviewStore, N>,
    applicant: &str,
    application_type: ApplicationType,
) -> Application
where
    N: NotificationSender + 'static,
{
    let draft = complete_draft(service, applicant, application_type);
    service
        .submit(&user(applicant), &draft.id)
        .expect("complete draft submits")
}

pub(super) fn waitlisted(service: &TestService, applicant: &str) -> Application {
    let application = submitted(service, applicant, ApplicationType::Resident);
    service
        .update_status(&user(ADMIN), &application.id, ApplicationStatus::Waitlisted)
        .expect("admin waitlists")
}

pub(super) fn ids(applications: &[Application]) -> Vec<ApplicationId> {
    applications.iter().map(|app| app.id.clone()).collect()
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<(ApplicationId, Outcome)>>,
}

impl RecordingNotifier {
    pub(super) fn outcomes(&self) -> Vec<(ApplicationId, Outcome)> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn count(&self, outcome: Outcome) -> usize {
        self.outcomes()
            .iter()
            .filter(|(_, sent)| *sent == outcome)
            .count()
    }
}

impl NotificationSender for RecordingNotifier {
    fn send(&self, application: &Application, outcome: Outcome) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push((application.id.clone(), outcome));
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationSender for FailingNotifier {
    fn send(&self, _application: &Application, _outcome: Outcome) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct RecordingEnricher {
    calls: Mutex<Vec<ApplicationId>>,
}

impl RecordingEnricher {
    pub(super) fn calls(&self) -> Vec<ApplicationId> {
        self.calls.lock().expect("enricher mutex poisoned").clone()
    }
}

impl ProfileEnricher for RecordingEnricher {
    fn enrich(&self, application: &Application) -> Result<(), EnrichmentError> {
        self.calls
            .lock()
            .expect("enricher mutex poisoned")
            .push(application.id.clone());
        Ok(())
    }
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    application_router(Arc::new(service))
}

pub(super) fn json_request(method: Method, uri: &str, caller: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(caller) = caller {
        builder = builder.header(CALLER_HEADER, caller);
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
        .expect("request builds")
}

pub(super) fn empty_request(method: Method, uri: &str, caller: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header(CALLER_HEADER, caller);
    }
    builder.body(Body::empty()).expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Store whose event listings and row reads stall, widening the window
/// between a transaction's read and its save.
pub(super) struct SlowReads {
    pub(super) inner: Arc<InMemoryReviewStore>,
    pub(super) delay: Duration,
}

impl ApplicationRepository for SlowReads {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        self.inner.insert(application)
    }

    fn update(&self, application: Application) -> Result<Application, RepositoryError> {
        self.inner.update(application)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let row = self.inner.fetch(id);
        std::thread::sleep(self.delay);
        row
    }

    fn find_for_applicant(
        &self,
        applicant: &UserId,
        event: &EventId,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.find_for_applicant(applicant, event)
    }

    fn for_event(&self, event: &EventId) -> Result<Vec<Application>, RepositoryError> {
        let rows = self.inner.for_event(event);
        std::thread::sleep(self.delay);
        rows
    }

    fn form_template(
        &self,
        event: &EventId,
        application_type: ApplicationType,
    ) -> Result<Option<FormTemplate>, RepositoryError> {
        self.inner.form_template(event, application_type)
    }

    fn response(
        &self,
        application: &ApplicationId,
        field_key: &str,
    ) -> Result<Option<FieldResponse>, RepositoryError> {
        self.inner.response(application, field_key)
    }

    fn responses(&self, application: &ApplicationId) -> Result<Vec<FieldResponse>, RepositoryError> {
        self.inner.responses(application)
    }

    fn insert_response(&self, response: FieldResponse) -> Result<FieldResponse, RepositoryError> {
        self.inner.insert_response(response)
    }

    fn update_response(&self, response: FieldResponse) -> Result<FieldResponse, RepositoryError> {
        self.inner.update_response(response)
    }

    fn commit(&self, batch: WriteBatch) -> Result<Vec<Application>, RepositoryError> {
        self.inner.commit(batch)
    }

    fn claim_enrichment(
        &self,
        user: &UserId,
        application: &ApplicationId,
    ) -> Result<bool, RepositoryError> {
        self.inner.claim_enrichment(user, application)
    }
}
