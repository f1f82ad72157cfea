use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_id!(
    /// Identifier wrapper for applications.
    ApplicationId
);
string_id!(
    /// Applicant, reviewer or administrator account.
    UserId
);
string_id!(
    /// Event (cohort, conference, residency round) that applications target.
    EventId
);

/// Lifecycle status tracked for every application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    UnderReview,
    Accepted,
    Rejected,
    Waitlisted,
    Cancelled,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Waitlisted => "waitlisted",
            ApplicationStatus::Cancelled => "cancelled",
        }
    }

    /// Accepted, rejected and cancelled applications never change status again.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Accepted | ApplicationStatus::Rejected | ApplicationStatus::Cancelled
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationType {
    Resident,
    Mentor,
    Speaker,
}

impl ApplicationType {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationType::Resident => "resident",
            ApplicationType::Mentor => "mentor",
            ApplicationType::Speaker => "speaker",
        }
    }
}

/// One application per (applicant, event).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub applicant_id: UserId,
    pub applicant_email: String,
    pub event_id: EventId,
    pub application_type: ApplicationType,
    pub status: ApplicationStatus,
    pub is_complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Manual waitlist rank; only set while the status is `Waitlisted`.
    pub waitlist_order: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Row version the store bumps on every save; a save carrying an older
    /// version is rejected as a conflict.
    #[serde(default)]
    pub version: u64,
}

impl Application {
    pub fn draft(id: ApplicationId, request: NewApplication, now: DateTime<Utc>) -> Self {
        Self {
            id,
            applicant_id: request.applicant_id,
            applicant_email: request.applicant_email,
            event_id: request.event_id,
            application_type: request.application_type,
            status: ApplicationStatus::Draft,
            is_complete: false,
            completed_at: None,
            submitted_at: None,
            waitlist_order: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// Input for the idempotent create-or-get call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub applicant_id: UserId,
    pub applicant_email: String,
    pub event_id: EventId,
    pub application_type: ApplicationType,
}

/// Latest answer for one form field. Last write wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldResponse {
    pub application_id: ApplicationId,
    pub field_key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Field key/value pair used by bulk saves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEntry {
    pub field_key: String,
    pub value: String,
}

/// Whether an edit may silently un-submit an application.
///
/// Autosaves from the applicant revert a submitted application to draft;
/// deliberate saves by staff keep the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditIntent {
    #[default]
    Autosave,
    Intentional,
}

/// Outcome handed to the notification sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum Outcome {
    FormCompleted,
    Submitted,
    StatusChanged(ApplicationStatus),
}

impl Outcome {
    pub fn template(self) -> String {
        match self {
            Outcome::FormCompleted => "application_form_completed".to_string(),
            Outcome::Submitted => "application_submitted".to_string(),
            Outcome::StatusChanged(status) => format!("application_{}", status.label()),
        }
    }
}
