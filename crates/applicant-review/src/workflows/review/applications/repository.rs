use serde::{Deserialize, Serialize};

use super::completeness::FormTemplate;
use super::domain::{
    Application, ApplicationId, ApplicationType, EventId, FieldResponse, Outcome, UserId,
};
use crate::workflows::review::error::RepositoryError;

/// A single row write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Write {
    /// Replace the application row, provided nobody saved it since `version` was read.
    SaveApplication(Application),
    /// Insert or replace the response for `(application_id, field_key)`.
    UpsertResponse(FieldResponse),
}

/// Writes that the store applies all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_application(&mut self, application: Application) -> &mut Self {
        self.writes.push(Write::SaveApplication(application));
        self
    }

    pub fn upsert_response(&mut self, response: FieldResponse) -> &mut Self {
        self.writes.push(Write::UpsertResponse(response));
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }
}

/// Storage abstraction so the service module can be exercised in isolation.
///
/// Implementations enforce uniqueness of `(applicant, event)`, of the
/// applicant e-mail within an event and of `(application, field_key)`.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    /// Version-checked save; returns the stored row with its new version.
    /// Fails with `Conflict` when the row changed since it was read.
    fn update(&self, application: Application) -> Result<Application, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    fn find_for_applicant(
        &self,
        applicant: &UserId,
        event: &EventId,
    ) -> Result<Option<Application>, RepositoryError>;
    fn for_event(&self, event: &EventId) -> Result<Vec<Application>, RepositoryError>;

    fn form_template(
        &self,
        event: &EventId,
        application_type: ApplicationType,
    ) -> Result<Option<FormTemplate>, RepositoryError>;

    fn response(
        &self,
        application: &ApplicationId,
        field_key: &str,
    ) -> Result<Option<FieldResponse>, RepositoryError>;
    fn responses(&self, application: &ApplicationId) -> Result<Vec<FieldResponse>, RepositoryError>;
    /// Fails with `Conflict` when a response for the key already exists.
    fn insert_response(&self, response: FieldResponse) -> Result<FieldResponse, RepositoryError>;
    /// Fails with `NotFound` when no response for the key exists yet.
    fn update_response(&self, response: FieldResponse) -> Result<FieldResponse, RepositoryError>;

    /// Apply every write or none of them.
    ///
    /// Application saves are version-checked like [`update`](Self::update).
    /// Returns the saved applications as stored, in write order.
    fn commit(&self, batch: WriteBatch) -> Result<Vec<Application>, RepositoryError>;

    /// Record that enrichment ran for `(user, application)`.
    ///
    /// Returns `true` only for the first caller.
    fn claim_enrichment(
        &self,
        user: &UserId,
        application: &ApplicationId,
    ) -> Result<bool, RepositoryError>;
}

/// Fire-and-forget applicant messaging (e-mail, in-app, ...).
pub trait NotificationSender: Send + Sync {
    fn send(&self, application: &Application, outcome: Outcome) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// One-time profile enrichment triggered by the first acceptance.
pub trait ProfileEnricher: Send + Sync {
    fn enrich(&self, application: &Application) -> Result<(), EnrichmentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("profile enrichment failed: {0}")]
    Upstream(String),
}
