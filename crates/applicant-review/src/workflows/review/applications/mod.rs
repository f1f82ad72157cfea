//! Application intake and lifecycle: form completeness, submission, status
//! decisions and the manual waitlist.

pub mod completeness;
pub mod domain;
pub mod lifecycle;
pub mod repository;
pub mod router;
pub mod service;
pub mod waitlist;

#[cfg(test)]
mod tests;

pub use completeness::{
    CompletenessChecker, CompletenessReport, FieldDefinition, FormTemplate, FormTemplateError,
    Requirement,
};
pub use domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationType, EditIntent, EventId,
    FieldResponse, NewApplication, Outcome, ResponseEntry, UserId,
};
pub use lifecycle::{ApplicationStateMachine, EditContext, EditEffect, Transition};
pub use repository::{
    ApplicationRepository, EnrichmentError, NotificationSender, NotifyError, ProfileEnricher,
    Write, WriteBatch,
};
pub use router::application_router;
pub use service::{ApplicationService, BulkResponseUpdate, ResponseUpdate};
pub use waitlist::WaitlistRanker;
