use chrono::{DateTime, Utc};
use serde::Serialize;

use super::completeness::{CompletenessReport, FieldDefinition};
use super::domain::{Application, ApplicationStatus, ApplicationType, EditIntent};
use crate::workflows::review::access::Role;
use crate::workflows::review::error::{ConflictError, ReviewError, ValidationError};

/// Status change produced by an administrative decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    /// False when the application already had the requested status.
    pub changed: bool,
}

/// What an edit did to the owning application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EditEffect {
    pub reverted_to_draft: bool,
    pub just_completed: bool,
}

/// Facts about an edit that decide whether it un-submits the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditContext {
    pub intent: EditIntent,
    /// At least one edited field is currently required.
    pub touches_required: bool,
    /// Every edited field is covered by the speaker logistics exception.
    pub speaker_exempt: bool,
}

/// Owns status transitions and the reversion rules for edits.
pub struct ApplicationStateMachine;

impl ApplicationStateMachine {
    /// Whether an administrative decision may move `from` to `to`.
    pub fn can_transition(from: ApplicationStatus, to: ApplicationStatus) -> bool {
        use ApplicationStatus::*;

        match from {
            Submitted => matches!(to, UnderReview | Accepted | Rejected | Waitlisted | Cancelled),
            UnderReview => matches!(to, Submitted | Accepted | Rejected | Waitlisted | Cancelled),
            Waitlisted => matches!(to, UnderReview | Accepted | Rejected | Cancelled),
            Draft | Accepted | Rejected | Cancelled => false,
        }
    }

    /// Apply a decision. Re-deciding the current status is a no-op.
    pub fn decide(
        application: &mut Application,
        to: ApplicationStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition, ConflictError> {
        let from = application.status;
        if from == to {
            return Ok(Transition {
                from,
                to,
                changed: false,
            });
        }

        if !Self::can_transition(from, to) {
            return Err(ConflictError::InvalidTransition { from, to });
        }

        application.status = to;
        application.updated_at = now;
        if from == ApplicationStatus::Waitlisted {
            application.waitlist_order = None;
        }

        Ok(Transition {
            from,
            to,
            changed: true,
        })
    }

    /// Move a draft to submitted once every required field is answered.
    pub fn submit(
        application: &mut Application,
        report: &CompletenessReport,
        now: DateTime<Utc>,
    ) -> Result<(), ReviewError> {
        if application.status != ApplicationStatus::Draft {
            return Err(ConflictError::NotDraft {
                status: application.status,
            }
            .into());
        }

        if !report.is_complete {
            return Err(ValidationError::MissingFields {
                missing: report.missing_field_keys.clone(),
            }
            .into());
        }

        Self::track_completeness(application, report, now);
        application.status = ApplicationStatus::Submitted;
        application.submitted_at = Some(now);
        application.updated_at = now;
        Ok(())
    }

    /// First reviewer assignment opens the review.
    pub fn begin_review(application: &mut Application, now: DateTime<Utc>) -> bool {
        if application.status != ApplicationStatus::Submitted {
            return false;
        }

        application.status = ApplicationStatus::UnderReview;
        application.updated_at = now;
        true
    }

    /// Reject edits the caller's role may not make in the current status.
    pub fn ensure_editable(
        application: &Application,
        role: Role,
        field: &FieldDefinition,
    ) -> Result<(), ConflictError> {
        let status = application.status;
        if status.is_terminal() {
            return Err(ConflictError::Locked { status });
        }

        if role.is_staff() {
            return Ok(());
        }

        match status {
            ApplicationStatus::Draft | ApplicationStatus::Submitted => Ok(()),
            _ if Self::speaker_exempt(application, field) => Ok(()),
            _ => Err(ConflictError::Locked { status }),
        }
    }

    /// Only staff saving on the applicant's behalf may keep the current status;
    /// an applicant's own edit is always treated as an autosave.
    pub fn effective_intent(role: Role, requested: EditIntent) -> EditIntent {
        if role.is_staff() {
            requested
        } else {
            EditIntent::Autosave
        }
    }

    /// Submitted speakers may keep logistics fields current without re-review.
    pub fn speaker_exempt(application: &Application, field: &FieldDefinition) -> bool {
        application.application_type == ApplicationType::Speaker
            && application.status != ApplicationStatus::Draft
            && !application.status.is_terminal()
            && field.editable_after_submit
    }

    /// Fold the recomputed completeness into the application and revert
    /// autosaved edits of a submitted application back to draft.
    pub fn apply_edit(
        application: &mut Application,
        context: EditContext,
        report: &CompletenessReport,
        now: DateTime<Utc>,
    ) -> EditEffect {
        let just_completed = Self::track_completeness(application, report, now);

        let reverts = application.status == ApplicationStatus::Submitted
            && context.intent == EditIntent::Autosave
            && !context.speaker_exempt
            && (context.touches_required || !report.is_complete);

        if reverts {
            application.status = ApplicationStatus::Draft;
            application.submitted_at = None;
        }
        application.updated_at = now;

        EditEffect {
            reverted_to_draft: reverts,
            just_completed,
        }
    }

    fn track_completeness(
        application: &mut Application,
        report: &CompletenessReport,
        now: DateTime<Utc>,
    ) -> bool {
        let just_completed = report.is_complete && !application.is_complete;
        application.is_complete = report.is_complete;
        if just_completed {
            application.completed_at = Some(now);
        } else if !report.is_complete {
            application.completed_at = None;
        }
        just_completed
    }
}
